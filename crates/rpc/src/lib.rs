//! # headless-wallet-rpc
//!
//! Request, response and error types shared by the simulated wallet providers and the bridge.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// JSON-RPC and EIP-1193 error bindings
pub mod error;

/// EIP-1193 request types
pub mod request;

/// Response types
pub mod response;
