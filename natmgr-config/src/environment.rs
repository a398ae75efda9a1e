use std::fmt;
use std::io;

/// Name of the environment variable that selects the runtime environment.
const ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Runtime environment the daemon is deployed in.
///
/// Selects which environment-specific configuration file is layered on top of
/// the base configuration. Defaults to [`Environment::Dev`] when the
/// `APP_ENVIRONMENT` variable is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`.
    ///
    /// An unset variable falls back to [`Environment::Dev`]; an unrecognized
    /// value is an error so that a typo never silently runs dev settings in
    /// production.
    pub fn load() -> Result<Self, io::Error> {
        match std::env::var(ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse().map_err(|unknown: String| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("`{unknown}` is not a supported environment, use dev, staging or prod"),
                )
            }),
            Err(std::env::VarError::NotPresent) => Ok(Environment::Dev),
            Err(err) => Err(io::Error::new(io::ErrorKind::InvalidInput, err)),
        }
    }

    /// Returns the lowercase name used for configuration file stems.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(other.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parses_known_names() {
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Dev));
        assert_eq!("STAGING".parse::<Environment>(), Ok(Environment::Staging));
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Prod));
    }

    #[test]
    fn test_environment_rejects_unknown_names() {
        assert!("production".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_display_matches_file_stem() {
        assert_eq!(Environment::Prod.to_string(), "prod");
    }
}
