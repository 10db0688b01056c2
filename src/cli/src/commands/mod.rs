//! Subcommands of the `canopy` binary.

pub mod decide;
pub mod inspect;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canopy_core::config::Config;
use canopy_core::rbac::AccessPolicyTable;
use canopy_core::telemetry::{init_logging, LoggingConfig};
use clap::Args;

/// Where to read the hierarchy and policy definition from.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CANOPY_CONFIG")]
    pub config: PathBuf,
}

/// Load the configuration, install logging from its `[logging]` section,
/// then build the policy table.
pub fn load(args: &ConfigArgs, verbosity: u8) -> Result<(Config, AccessPolicyTable)> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    init_logging(&logging_for(&config.logging, verbosity))?;

    let table = config
        .build_table()
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    Ok((config, table))
}

/// `-v` raises the level to info, `-vv` to debug, `-vvv` to trace.
fn logging_for(base: &LoggingConfig, verbosity: u8) -> LoggingConfig {
    let level = match verbosity {
        0 => return base.clone(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    base.clone().with_level(level)
}

/// Read a JSON document from a file, or from stdin when `path` is `-`.
pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_level() {
        let base = LoggingConfig::default();
        assert_eq!(logging_for(&base, 0), base);
        assert_eq!(logging_for(&base, 2).level, "debug");
        assert_eq!(logging_for(&base, 9).level, "trace");
    }
}
