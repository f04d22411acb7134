//! # headless-wallet
//!
//! Simulated wallets for automated dApp testing.
//!
//! A [`HeadlessWallet`] bundles an EIP-1193 provider ([`EvmProvider`]) and a Wallet Standard
//! provider ([`SolanaProvider`]) that share one account registry. Both answer requests without
//! any user interaction and can be driven from a test through [`HeadlessWallet::apply`].
//!
//! The wallet never produces real signatures: every signature is a deterministic digest of the
//! signing key and the payload, which is enough for dApps that only forward them.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

mod macros;

pub mod accounts;
pub mod chains;
pub mod discovery;
pub mod error;
pub mod events;
pub mod evm;
pub mod logging;
pub mod security;
pub mod solana;
pub mod state;
pub mod store;

mod wallet;
pub use wallet::{HeadlessWallet, WalletOptions, WalletSnapshot, WalletUpdate};

pub use accounts::{AccountDescriptor, AccountInfo, AccountRegistry, AccountType};
pub use chains::{Chain, ChainRegistry, ChainType};
pub use discovery::{ProviderInfo, WindowEvent, WindowEventKind, WindowTarget};
pub use error::ValidationError;
pub use events::{EventEmitter, EvmEvent, EvmEventKind, ListenerId, SolanaEvent, WalletEvent};
pub use evm::EvmProvider;
pub use logging::{LoggingManager, WalletLogLayer};
pub use security::{SecurityGuard, SecurityViolation};
pub use solana::SolanaProvider;
pub use state::{ProviderState, ProviderStateStore};
pub use store::{ObservableStore, Subscription};
