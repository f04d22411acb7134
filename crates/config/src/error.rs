//! config error handling
use std::{collections::HashSet, fmt};

/// The message prefixed to every config extraction failure
pub const FAILED_TO_EXTRACT_CONFIG_MSG: &str = "failed to extract headless wallet config:";

/// Represents a failed attempt to extract `Config` from a `Figment`
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ExtractConfigError {
    /// error thrown by figment while extracting the `Config`
    #[error("{}", DisplayFigmentError(.0))]
    Figment(#[source] figment::Error),
    /// a value was deserialized fine but is outside of its valid range
    #[error("{FAILED_TO_EXTRACT_CONFIG_MSG}\ninvalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl ExtractConfigError {
    /// Wraps the figment error
    pub fn new(error: figment::Error) -> Self {
        Self::Figment(error)
    }

    pub(crate) fn invalid_value(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { key, reason: reason.into() }
    }
}

/// Lists every distinct error of a figment error chain on its own line.
struct DisplayFigmentError<'a>(&'a figment::Error);

impl fmt::Display for DisplayFigmentError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut unique = HashSet::with_capacity(self.0.count());
        writeln!(f, "{FAILED_TO_EXTRACT_CONFIG_MSG}")?;
        for err in self.0.clone() {
            let err = err.to_string();
            if unique.insert(err.clone()) {
                writeln!(f, "{err}")?;
            }
        }
        Ok(())
    }
}
