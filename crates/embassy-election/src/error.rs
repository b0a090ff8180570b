//! Election error types

/// Result type for election operations
pub type Result<T> = std::result::Result<T, ElectionError>;

/// Election-specific error types
///
/// Errors are `Clone` so the same failure can be logged by a background task
/// and handed to an observer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElectionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No coordination service connection found")]
    NotConnected,

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("No entry at key: {key}")]
    NoEntry { key: String },

    #[error("Lock not held: {0}")]
    LockNotHeld(String),

    #[error("Already a candidate; step down first")]
    AlreadyCandidate,

    #[error("Already watching the leader; stop watching first")]
    AlreadyWatching,

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl ElectionError {
    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn coordination<T: Into<String>>(msg: T) -> Self {
        Self::Coordination(msg.into())
    }

    pub fn no_entry<T: Into<String>>(key: T) -> Self {
        Self::NoEntry { key: key.into() }
    }

    pub fn lock_not_held<T: Into<String>>(key: T) -> Self {
        Self::LockNotHeld(key.into())
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Coordination(_) | Self::NoEntry { .. } | Self::LockNotHeld(_)
        )
    }
}

impl From<tokio::task::JoinError> for ElectionError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ElectionError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for ElectionError {
    fn from(err: toml::ser::Error) -> Self {
        Self::configuration(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ElectionError::no_entry("service/embassy/leader");
        assert_eq!(err.to_string(), "No entry at key: service/embassy/leader");

        let err = ElectionError::NotConnected;
        assert_eq!(err.to_string(), "No coordination service connection found");

        let err = ElectionError::coordination("session expired");
        assert!(err.to_string().contains("session expired"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ElectionError::coordination("partition").is_transient());
        assert!(ElectionError::no_entry("k").is_transient());
        assert!(!ElectionError::configuration("bad duration").is_transient());
        assert!(!ElectionError::AlreadyCandidate.is_transient());
        assert!(!ElectionError::NotConnected.is_transient());
    }

    #[test]
    fn test_toml_error_conversion() {
        let err: ElectionError = toml::from_str::<toml::Value>("key = ")
            .unwrap_err()
            .into();
        assert!(matches!(err, ElectionError::Configuration(_)));
    }
}
