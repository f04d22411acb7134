/// A `info!` helper macro that emits to the target the wallet logger listens for
macro_rules! wallet_info {
    ($($arg:tt)*) => {
        tracing::info!(target: $crate::logging::WALLET_USER_LOG_TARGET, $($arg)*);
    };
}

/// A `warn!` helper macro that emits to the target the wallet logger listens for
macro_rules! wallet_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: $crate::logging::WALLET_USER_LOG_TARGET, $($arg)*);
    };
}

pub(crate) use wallet_info;
pub(crate) use wallet_warn;
