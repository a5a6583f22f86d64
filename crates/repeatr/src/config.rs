//! CLI-side configuration: locate the file, apply flag overrides, and
//! translate to `repeatr_core::RouterConfig`.
//!
//! Core never sees these types -- it receives a pre-built `RouterConfig`.

use std::path::PathBuf;

use clap::ValueEnum;
use repeatr_config::{Config, config_path, load_config_from, to_router_config};
use repeatr_core::RouterConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{OutputOpts, should_color};

/// `--config`, else `REPEATR_CONFIG`, else the system default.
pub fn resolved_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config file and apply `--state-dir`.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = resolved_path(global);
    let mut cfg = load_config_from(&path).map_err(|e| CliError::from_config(e, &path))?;
    if let Some(ref dir) = global.state_dir {
        cfg.state_dir.clone_from(dir);
    }
    tracing::debug!(path = %path.display(), state_dir = %cfg.state_dir.display(), "configuration loaded");
    Ok(cfg)
}

/// Validate `cfg` and build the runtime configuration.
pub fn router_config(global: &GlobalOpts, cfg: &Config) -> Result<RouterConfig, CliError> {
    to_router_config(cfg).map_err(|e| CliError::from_config(e, &resolved_path(global)))
}

/// Flags win over the config file's `[defaults]`.
pub fn output_opts(global: &GlobalOpts, cfg: Option<&Config>) -> OutputOpts {
    let format = global.output.unwrap_or_else(|| {
        cfg.and_then(|c| parse_or_warn::<OutputFormat>("defaults.output", &c.defaults.output))
            .unwrap_or(OutputFormat::Table)
    });
    let color = global.color.unwrap_or_else(|| {
        cfg.and_then(|c| parse_or_warn::<ColorMode>("defaults.color", &c.defaults.color))
            .unwrap_or(ColorMode::Auto)
    });

    OutputOpts {
        format,
        color: should_color(color),
        quiet: global.quiet,
    }
}

fn parse_or_warn<T: ValueEnum>(field: &str, raw: &str) -> Option<T> {
    match T::from_str(raw, true) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(field, value = raw, "ignoring unrecognized setting");
            None
        }
    }
}
