//! Print the effective device profile.

use anyhow::Result;
use bootflash::DeviceProfile;

use crate::config::{Config, ProfileConfig};

/// Print `profile` as a TOML config file to stdout.
pub(crate) fn cmd_profile(profile: &DeviceProfile) -> Result<()> {
    let config = Config {
        profile: ProfileConfig::from(profile),
    };
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
