//! # headless-wallet-bridge
//!
//! Installs [`headless_wallet::HeadlessWallet`]s into pages and drives them from a test.
//!
//! The driver side ([`MessageBridge`]) sends authenticated JSON commands into a page through a
//! [`PageTransport`] and correlates the replies. The page side ([`PageDispatcher`]) validates
//! them and manages the wallet instances of its [`Window`]. Pages live either in process
//! ([`InProcessPage`]) or behind a [`PageServer`].
//!
//! ```rust,no_run
//! use headless_wallet::{AccountDescriptor, WalletOptions, security::EnvironmentSnapshot};
//! use headless_wallet_bridge::{InProcessPage, InstallOptions, WalletInstaller};
//! use headless_wallet_config::Config;
//!
//! # async fn run() -> eyre::Result<()> {
//! let config = Config::load()?;
//! let page = InProcessPage::open(
//!     "context",
//!     "http://localhost:3000".parse()?,
//!     EnvironmentSnapshot::from_process(),
//!     &config,
//! );
//! let installer = WalletInstaller::new(config, EnvironmentSnapshot::from_process());
//! let options = WalletOptions { accounts: vec![AccountDescriptor::evm(["1"])], ..Default::default() };
//! let wallet = installer.install(page, InstallOptions::new(options)).await?;
//! let state = wallet.switch_chain("0x89").await?;
//! assert_eq!(state.evm.chain_id.as_deref(), Some("0x89"));
//! installer.cleanup_all().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

pub mod bridge;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod installer;
pub mod instances;
pub mod isolation;
pub mod message;
pub mod page;
pub mod rate_limit;
pub mod realm;
pub mod server;
pub mod session;
pub mod transport;

pub use bridge::{BridgeState, MessageBridge};
pub use client::WalletClient;
pub use dispatcher::PageDispatcher;
pub use error::{BridgeError, InstallationError};
pub use installer::{InstallOptions, WalletInstaller};
pub use instances::{InstanceRegistry, Reservation, WalletInstance};
pub use isolation::{CleanupFailure, CleanupSummary, IsolationGroup, IsolationManager};
pub use message::{BridgeMessage, BridgeResponse, ErrorPayload, MessageType};
pub use page::InProcessPage;
pub use realm::Window;
pub use server::{HttpPageTransport, PageServer};
pub use session::{BridgeSession, SessionCredentials};
pub use transport::PageTransport;
