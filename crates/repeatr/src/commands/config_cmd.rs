//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use repeatr_config::{Config, save_config_to};
use repeatr_core::{AssignmentPolicy, Band, BridgeMode};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const DEFAULT_PASSPHRASE_ENV: &str = "REPEATR_AP_PASSPHRASE";

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Copy of `cfg` safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    if shown.access_point.passphrase.is_some() {
        shown.access_point.passphrase = Some("********".into());
    }
    shown
}

fn pick<T: Copy>(prompt: &str, choices: &[(&str, T)], default: usize) -> Result<T, CliError> {
    let labels: Vec<&str> = choices.iter().map(|(label, _)| *label).collect();
    let selection = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(default)
        .interact()
        .map_err(prompt_err)?;
    choices
        .get(selection)
        .map(|(_, value)| *value)
        .ok_or_else(|| CliError::Internal(format!("selection {selection} out of range")))
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let out = config::output_opts(global, Some(&cfg));
            let shown = redacted(&cfg);
            let rendered = if out.format == OutputFormat::Table {
                toml::to_string_pretty(&shown).map_err(|e| CliError::Internal(e.to_string()))?
            } else {
                output::render_single(out.format, &shown, |c| format!("{c:#?}"), |c| {
                    c.access_point.ssid.clone()
                })
            };
            output::print_output(rendered.trim_end(), out.quiet);
            Ok(())
        }

        ConfigCommand::Validate => {
            let cfg = config::load(global)?;
            config::router_config(global, &cfg)?;
            if !global.quiet {
                eprintln!("✓ {} is valid", config::resolved_path(global).display());
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::resolved_path(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::resolved_path(global);
    eprintln!("repeatr -- configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt("A configuration already exists. Overwrite it?")
            .default(false)
            .interact()
            .map_err(prompt_err)?;
        if !overwrite {
            eprintln!("Nothing written.");
            return Ok(());
        }
    }

    let mut cfg = Config::default();
    if let Some(ref dir) = global.state_dir {
        cfg.state_dir.clone_from(dir);
    }

    // 1. Regulatory domain
    cfg.regulatory_domain = Input::<String>::new()
        .with_prompt("Country code (regulatory domain)")
        .default(cfg.regulatory_domain.clone())
        .interact_text()
        .map_err(prompt_err)?
        .to_ascii_uppercase();

    // 2. Access point
    cfg.access_point.ssid = Input::new()
        .with_prompt("Access point SSID")
        .default(cfg.access_point.ssid.clone())
        .interact_text()
        .map_err(prompt_err)?;

    cfg.access_point.band = pick(
        "Band",
        &[("2.4 GHz", Band::Ghz2_4), ("5 GHz", Band::Ghz5)],
        0,
    )?;
    let default_channel = match cfg.access_point.band {
        Band::Ghz2_4 => 6,
        Band::Ghz5 => 36,
    };
    cfg.access_point.channel = Input::new()
        .with_prompt("Channel")
        .default(default_channel)
        .interact_text()
        .map_err(prompt_err)?;

    // 3. Passphrase
    let storage = pick(
        "Where should the passphrase live?",
        &[
            ("Environment variable (recommended)", true),
            ("Config file (plaintext)", false),
        ],
        0,
    )?;
    if storage {
        let env_name: String = Input::new()
            .with_prompt("Variable name")
            .default(DEFAULT_PASSPHRASE_ENV.into())
            .interact_text()
            .map_err(prompt_err)?;
        cfg.access_point.passphrase_env = Some(env_name);
    } else {
        let passphrase = rpassword::prompt_password("Passphrase (8-63 characters): ")
            .map_err(prompt_err)?;
        let again = rpassword::prompt_password("Repeat passphrase: ").map_err(prompt_err)?;
        if passphrase != again {
            return Err(CliError::Validation {
                field: "access_point.passphrase".into(),
                reason: "entries did not match".into(),
            });
        }
        cfg.access_point.passphrase = Some(passphrase);
    }

    // 4. Roles and port mode
    cfg.assignment = pick(
        "Which radio connects upstream?",
        &[
            ("USB radio is the uplink (recommended)", AssignmentPolicy::RemovableUplink),
            ("Onboard radio is the uplink", AssignmentPolicy::OnboardUplink),
        ],
        0,
    )?;
    cfg.default_bridge_mode = pick(
        "Ethernet port",
        &[
            ("Client: own routed subnet", BridgeMode::Client),
            ("Bridged: same network as the access point", BridgeMode::Bridged),
        ],
        0,
    )?;

    // 5. Validate and write
    cfg.validate()
        .map_err(|e| CliError::from_config(e, &config_path))?;
    save_config_to(&cfg, &config_path).map_err(|e| CliError::from_config(e, &config_path))?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    if let Some(ref env_name) = cfg.access_point.passphrase_env {
        eprintln!("  Export {env_name} before running repeatr boot.");
    }
    eprintln!("\n  Check it: repeatr config validate");
    Ok(())
}
