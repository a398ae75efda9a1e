use natmgr_config::load_config;
use natmgr_config::shared::NatmgrdConfig;

use crate::error::{NatmgrdError, NatmgrdResult};

/// Loads and validates the daemon configuration.
///
/// Uses the standard configuration loading mechanism from [`natmgr_config`]
/// and validates the resulting [`NatmgrdConfig`] before returning it.
pub fn load_natmgrd_config() -> NatmgrdResult<NatmgrdConfig> {
    let config = load_config::<NatmgrdConfig>().map_err(NatmgrdError::config)?;
    config.validate().map_err(NatmgrdError::config)?;

    Ok(config)
}
