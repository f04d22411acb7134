mod bridge;
mod installer;
mod server;

use headless_wallet::security::EnvironmentSnapshot;
use headless_wallet_bridge::InProcessPage;
use headless_wallet_config::Config;
use std::sync::Arc;

#[allow(unused)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Opens an in-process page on a local dev server url.
pub(crate) fn open_page(context_id: &str, config: &Config) -> Arc<InProcessPage> {
    InProcessPage::open(
        context_id,
        "http://localhost:5173/".parse().unwrap(),
        EnvironmentSnapshot::default(),
        config,
    )
}

fn main() {}
