use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::base::ValidationError;
use crate::shared::store::{StoreConnectionConfig, StoreConnectionConfigWithoutSecrets};

/// Channel on which state cleanup is announced to peer daemons when the
/// configuration does not override it.
pub const DEFAULT_CLEANUP_CHANNEL: &str = "NAT_DB_CLEANUP_NOTIFICATION";

/// Complete configuration for the NAT manager daemon.
///
/// Aggregates the state store connection settings and the cleanup
/// announcement channel. Typically loaded from configuration files at
/// startup.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct NatmgrdConfig {
    /// Connection settings for the state store.
    pub store: StoreConnectionConfig,
    /// Channel on which state cleanup is announced to peer daemons.
    #[serde(default = "default_cleanup_channel")]
    pub cleanup_channel: String,
}

fn default_cleanup_channel() -> String {
    DEFAULT_CLEANUP_CHANNEL.to_owned()
}

impl NatmgrdConfig {
    /// Validates the complete daemon configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.store.host.is_empty() {
            return Err(ValidationError::EmptyStoreHost);
        }

        if self.cleanup_channel.is_empty() {
            return Err(ValidationError::EmptyCleanupChannel);
        }

        Ok(())
    }
}

impl Config for NatmgrdConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Same as [`NatmgrdConfig`] but without secrets.
///
/// This type implements [`Serialize`] because it does not contain secrets,
/// so is safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatmgrdConfigWithoutSecrets {
    /// Connection settings for the state store.
    pub store: StoreConnectionConfigWithoutSecrets,
    /// Channel on which state cleanup is announced to peer daemons.
    pub cleanup_channel: String,
}

impl From<NatmgrdConfig> for NatmgrdConfigWithoutSecrets {
    fn from(value: NatmgrdConfig) -> Self {
        NatmgrdConfigWithoutSecrets {
            store: value.store.into(),
            cleanup_channel: value.cleanup_channel,
        }
    }
}
