use anyhow::{Context, Result};
use boothsync::settings::{SettingsDraft, SettingsStore};
use boothsync::{BoothApp, BoothConfig, RunMode};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "boothsync")]
#[command(about = "Live gallery, capture pipeline and kiosk session engine for event photo booths")]
#[command(version)]
#[command(long_about = "Boothsync keeps an event gallery in sync with the booth backend, \
drives the capture/process pipeline (code, render, upload, print) and runs the selfie kiosk \
session flow with its time-to-live watchdog.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "boothsync.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting anything")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write JSON logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live gallery viewer (default)
    Gallery {
        /// Use the multi-tile layout instead of the slideshow
        #[arg(long)]
        tiles: bool,
        /// Disable terminal key control
        #[arg(long)]
        no_keyboard: bool,
    },
    /// Run the capture/process pipeline once
    Capture {
        /// Link the promotion code to the person with this phone number
        #[arg(long, value_name = "PHONE")]
        recipient_phone: Option<String>,
    },
    /// Run one selfie kiosk session
    Kiosk {
        /// Link the promotion code to the person with this phone number
        #[arg(long, value_name = "PHONE")]
        recipient_phone: Option<String>,
    },
    /// Inspect or change the stored tile viewer settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the effective viewer settings
    Show,
    /// Store an override, e.g. `set grid_cols=4 fade_ms=500`
    Set {
        #[arg(required = true, value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },
    /// Drop the stored override and return to the defaults
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting boothsync v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match BoothConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().context("invalid configuration")?;

    let (mode, keyboard, recipient_phone) = match args.command {
        Some(Command::Settings { action }) => return run_settings(&config, action),
        Some(Command::Gallery { tiles, no_keyboard }) => {
            (RunMode::Gallery { tiles }, !no_keyboard, None)
        }
        Some(Command::Capture { recipient_phone }) => (RunMode::Capture, false, recipient_phone),
        Some(Command::Kiosk { recipient_phone }) => (RunMode::Kiosk, false, recipient_phone),
        None => (RunMode::Gallery { tiles: false }, true, None),
    };

    let mut app = BoothApp::new(config, mode).map_err(|e| {
        error!("Failed to create app: {}", e);
        e
    })?;
    app.set_keyboard_enabled(keyboard);
    app.set_recipient_phone(recipient_phone);

    app.initialize().map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    app.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("boothsync exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    drop(log_guard);
    std::process::exit(exit_code);
}

fn run_settings(config: &BoothConfig, action: SettingsAction) -> Result<()> {
    let store = SettingsStore::file(&config.session.store_dir, config.viewer);

    match action {
        SettingsAction::Show => {}
        SettingsAction::Set { fields } => {
            let mut draft = SettingsDraft::from_settings(&store.load()?);
            draft.apply_overrides(&fields)?;
            draft.commit(&store)?;
            info!("Stored viewer settings override");
        }
        SettingsAction::Reset => {
            store.clear()?;
            info!("Cleared viewer settings override");
        }
    }

    println!("{}", serde_json::to_string_pretty(&store.load()?)?);
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boothsync={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "boothsync.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# boothsync configuration file");
    println!("# Every key can also be set from the environment, e.g. BOOTHSYNC_GALLERY__EVENT_CODE=EV1");
    println!();
    println!("{}", toml::to_string_pretty(&BoothConfig::default())?);
    Ok(())
}
