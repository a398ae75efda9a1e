use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Connection settings for the state store endpoint.
///
/// All logical databases (application, configuration, and operational state)
/// live behind the same endpoint at fixed indices, so a single set of
/// connection settings covers every connection the daemon opens.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking secrets in the config into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConnectionConfig {
    /// Hostname or address of the state store.
    pub host: String,
    /// Port of the state store.
    pub port: u16,
    /// Optional username used to authenticate.
    pub username: Option<String>,
    /// Optional password used to authenticate.
    pub password: Option<SecretString>,
}

/// Same as [`StoreConnectionConfig`] but without secrets.
///
/// This type implements [`Serialize`] because it does not contain secrets,
/// so is safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConnectionConfigWithoutSecrets {
    /// Hostname or address of the state store.
    pub host: String,
    /// Port of the state store.
    pub port: u16,
    /// Optional username used to authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl From<StoreConnectionConfig> for StoreConnectionConfigWithoutSecrets {
    fn from(value: StoreConnectionConfig) -> Self {
        StoreConnectionConfigWithoutSecrets {
            host: value.host,
            port: value.port,
            username: value.username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_connection_config_deserializes_without_credentials() {
        let config: StoreConnectionConfig = serde_json::from_value(serde_json::json!({
            "host": "localhost",
            "port": 6379,
        }))
        .unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert!(config.username.is_none());
        assert!(config.password.is_none());
    }

    #[test]
    fn test_store_connection_config_without_secrets_drops_password() {
        let config: StoreConnectionConfig = serde_json::from_value(serde_json::json!({
            "host": "localhost",
            "port": 6379,
            "username": "natmgrd",
            "password": "hunter2",
        }))
        .unwrap();

        let without_secrets: StoreConnectionConfigWithoutSecrets = config.into();
        let serialized = serde_json::to_string(&without_secrets).unwrap();

        assert!(serialized.contains("natmgrd"));
        assert!(!serialized.contains("hunter2"));
    }
}
