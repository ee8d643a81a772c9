//! Kestrel plugin gateway host.
//!
//! Serves the plugin capability channel and admin endpoints, and checks
//! plugin manifests.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use kestrel_gateway::{PluginManifest, MANIFEST_FILE};
use kestrel_lib::config::KestrelConfig;
use kestrel_lib::server;
use kestrel_telemetry::{log_startup, LogFormat, Telemetry};

#[derive(Parser, Debug)]
#[command(name = "kestrel", about = "Kestrel OS plugin gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Log output format accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Pretty => LogFormat::Pretty,
        }
    }
}

/// Report format of `check-plugin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway host.
    Serve {
        /// Path to kestrel.toml. Defaults apply when omitted.
        #[arg(short, long, env = "KESTREL_CONFIG")]
        config: Option<PathBuf>,

        /// Listen address (overrides the config file).
        #[arg(long, env = "KESTREL_LISTEN")]
        listen: Option<String>,

        /// Directory of `<name>/plugin.toml` folders (overrides the config file).
        #[arg(long, env = "KESTREL_PLUGINS_DIR")]
        plugins_dir: Option<PathBuf>,

        /// Log level (overrides the config file; RUST_LOG wins over both).
        #[arg(long)]
        log_level: Option<String>,

        /// Log format (overrides the config file).
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Validate a plugin manifest without loading it.
    CheckPlugin {
        /// Plugin directory or plugin.toml path.
        path: PathBuf,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Run the check-plugin command.
fn run_check_plugin(path: &Path, format: OutputFormat) -> ExitCode {
    let manifest_path = if path.is_dir() {
        path.join(MANIFEST_FILE)
    } else {
        path.to_path_buf()
    };

    let result = PluginManifest::from_path(&manifest_path);

    if format == OutputFormat::Json {
        let output = match &result {
            Ok(manifest) => serde_json::json!({
                "file": manifest_path.display().to_string(),
                "valid": true,
                "manifest": manifest,
            }),
            Err(e) => serde_json::json!({
                "file": manifest_path.display().to_string(),
                "valid": false,
                "error": e.to_string(),
            }),
        };
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        match &result {
            Ok(manifest) => eprintln!(
                "✓ {} is valid ({} {})",
                manifest_path.display(),
                manifest.id(),
                manifest.plugin.version
            ),
            Err(e) => eprintln!("✗ {}: {}", manifest_path.display(), e),
        }
    }

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Run the serve command.
async fn run_serve(
    config_path: Option<&Path>,
    listen: Option<String>,
    plugins_dir: Option<PathBuf>,
    log_level: Option<String>,
    log_format: Option<LogFormatArg>,
) -> ExitCode {
    let mut config = match KestrelConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(dir) = plugins_dir {
        config.plugins_dir = Some(dir);
    }
    if let Some(level) = log_level {
        config.telemetry.log_level = level;
    }
    if let Some(format) = log_format {
        config.telemetry.log_format = format.into();
    }

    let telemetry = match Telemetry::init(config.telemetry.clone()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    log_startup!(
        service = %telemetry.config().service_name,
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen,
        "kestrel starting"
    );

    match server::run(config, telemetry.metrics().clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{:#}", e), "kestrel failed");
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            listen,
            plugins_dir,
            log_level,
            log_format,
        } => run_serve(config.as_deref(), listen, plugins_dir, log_level, log_format).await,
        Commands::CheckPlugin { path, format } => run_check_plugin(&path, format),
    }
}
