use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The state store host cannot be empty.
    #[error("`store.host` cannot be empty")]
    EmptyStoreHost,
    /// The cleanup notification channel cannot be empty.
    #[error("`cleanup_channel` cannot be empty")]
    EmptyCleanupChannel,
}
