use std::path::PathBuf;
use std::process;

use airsdk_config::{load_default, load_from_path, ClientConfig};
use airsdk_core::{AirError, Payload, Result};
use airsdk_endpoints::{AirApi, LegacyOutcome, Model};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;

/// airctl - command-line client for the resource API
///
/// Configuration discovery rules:
/// 1. If `--config PATH` (or `-c PATH`) is provided, that path is used.
/// 2. Otherwise, `airsdk_config::load_default()` is used, which probes:
///    - `/etc/airsdk/airsdk.toml`
///    - `./airsdk.toml`
///
/// The credential is read from `[api].api_key` or the environment variable
/// named by `[api].api_key_env`.
#[derive(Debug, Parser)]
#[command(
    name = "airctl",
    version,
    about = "airsdk command-line client",
    long_about = "airctl lists, reads, updates and deletes resources of the remote API through the airsdk runtime.",
    disable_help_subcommand = true
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long = "config", short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (overrides RUST_LOG if set).
    ///
    /// Accepts standard tracing levels (trace, debug, info, warn, error) or a
    /// full filter expression (e.g. "info,airsdk_endpoints=debug").
    #[arg(long = "log-level", short = 'L', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print loaded configuration summary.
    #[arg(long = "print-config", action = ArgAction::SetTrue)]
    print_config: bool,

    /// Validate configuration and exit.
    #[arg(long = "check-config", action = ArgAction::SetTrue)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List resources of a model, e.g. `airctl list Node -f simulation=<id>`.
    List {
        /// Model name or endpoint path.
        model: String,

        /// Filter as NAME=VALUE; may be repeated.
        #[arg(long = "filter", short = 'f', value_name = "NAME=VALUE")]
        filters: Vec<String>,

        /// Stop after this many results.
        #[arg(long = "limit", value_name = "N")]
        limit: Option<usize>,

        /// Fetch every page up front with this many requests in flight.
        #[arg(long = "workers", value_name = "N")]
        workers: Option<usize>,
    },

    /// Fetch one resource by primary key.
    Get { model: String, id: String },

    /// Partially update one resource.
    Update {
        model: String,
        id: String,

        /// Field as NAME=VALUE; VALUE is parsed as JSON, falling back to a string.
        #[arg(long = "set", short = 's', value_name = "NAME=VALUE", required = true)]
        fields: Vec<String>,
    },

    /// Delete one resource.
    Delete { model: String, id: String },

    /// Invoke a business verb, e.g. `airctl invoke Simulation start --id <id>`.
    Invoke {
        model: String,
        verb: String,

        /// Primary key for instance verbs.
        #[arg(long = "id")]
        id: Option<String>,

        /// JSON request body.
        #[arg(long = "body", value_name = "JSON")]
        body: Option<String>,
    },

    /// Call a method by its pre-v3 name, e.g. `airctl legacy get_simulations`.
    Legacy {
        name: String,

        /// Argument as NAME=VALUE; may be repeated.
        #[arg(long = "arg", short = 'a', value_name = "NAME=VALUE")]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Load before telemetry so `[telemetry].log_level` can pick the filter.
    let loaded = load_config(&cli);
    let level = cli.log_level.clone().or_else(|| {
        loaded
            .as_ref()
            .ok()
            .and_then(|(cfg, _)| cfg.telemetry.as_ref())
            .and_then(|t| t.log_level.clone())
    });

    if let Err(err) = airsdk_telemetry::init(level.as_deref()) {
        eprintln!("airctl: failed to initialise telemetry: {}", err);
        process::exit(1);
    }

    let config = match loaded {
        Ok((cfg, source)) => {
            tracing::info!("loaded configuration from {}", source);
            cfg
        }
        Err((err, source)) => {
            tracing::error!("failed to load configuration from {}: {}", source, err);
            process::exit(1);
        }
    };

    if let Err(err) = config.validate() {
        tracing::error!("configuration validation failed: {}", err);
        process::exit(1);
    }

    if cli.check_config {
        tracing::info!("configuration is valid");
        return;
    }

    if cli.print_config {
        print_config_summary(&config);
    }

    let Some(command) = cli.command else {
        if !cli.print_config {
            tracing::error!("no command given; see `airctl --help`");
            process::exit(2);
        }
        return;
    };

    if let Err(err) = run_blocking(config, command) {
        tracing::error!("{}", err);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> std::result::Result<(ClientConfig, String), (AirError, String)> {
    match cli.config {
        Some(ref path) => {
            let source = path.display().to_string();
            match load_from_path(path) {
                Ok(cfg) => Ok((cfg, source)),
                Err(err) => Err((err, source)),
            }
        }
        None => {
            let source = "default locations".to_string();
            match load_default() {
                Ok(cfg) => Ok((cfg, source)),
                Err(err) => Err((err, source)),
            }
        }
    }
}

/// Run one command on a Tokio runtime so `main` can stay synchronous.
fn run_blocking(config: ClientConfig, command: Command) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AirError::config(format!("failed to start runtime: {e}")))?;

    rt.block_on(run(config, command))
}

async fn run(config: ClientConfig, command: Command) -> Result<()> {
    let api = AirApi::from_config(&config)?;

    match command {
        Command::List {
            model,
            filters,
            limit,
            workers,
        } => {
            let endpoint = api.endpoint_named(&model)?;
            let filters = filters
                .iter()
                .map(|raw| split_assignment(raw))
                .collect::<Result<Vec<_>>>()?;

            let mut models = match workers {
                Some(workers) => endpoint.list_all(filters, workers).await?,
                None => {
                    let mut cursor = endpoint.list(filters)?;
                    let mut out = Vec::new();
                    while limit.map_or(true, |limit| out.len() < limit) {
                        match cursor.try_next().await? {
                            Some(model) => out.push(model),
                            None => break,
                        }
                    }
                    out
                }
            };
            if let Some(limit) = limit {
                models.truncate(limit);
            }
            print_json(&Value::Array(models.iter().map(model_json).collect()))
        }
        Command::Get { model, id } => {
            let instance = api.endpoint_named(&model)?.get(id.as_str()).await?;
            print_json(&model_json(&instance))
        }
        Command::Update { model, id, fields } => {
            let payload = parse_payload(&fields)?;
            let instance = api
                .endpoint_named(&model)?
                .update(id.as_str(), payload)
                .await?;
            print_json(&model_json(&instance))
        }
        Command::Delete { model, id } => {
            api.endpoint_named(&model)?.delete(id.as_str()).await?;
            tracing::info!("deleted {} {}", model, id);
            Ok(())
        }
        Command::Invoke {
            model,
            verb,
            id,
            body,
        } => {
            let body = body
                .map(|raw| {
                    serde_json::from_str::<Value>(&raw)
                        .map_err(|e| AirError::invalid_argument(format!("--body is not JSON: {e}")))
                })
                .transpose()?;
            let response = api
                .endpoint_named(&model)?
                .invoke(id.as_deref(), &verb, body)
                .await?;
            match response {
                Some(value) => print_json(&value),
                None => Ok(()),
            }
        }
        Command::Legacy { name, args } => {
            let outcome = api.legacy().call(&name, parse_payload(&args)?).await?;
            match outcome {
                LegacyOutcome::Model(instance) => print_json(&model_json(&instance)),
                LegacyOutcome::Cursor(cursor) => {
                    let models = cursor.collect().await?;
                    print_json(&Value::Array(models.iter().map(model_json).collect()))
                }
                LegacyOutcome::Value(value) => print_json(&value),
                LegacyOutcome::Done => Ok(()),
            }
        }
    }
}

fn split_assignment(raw: &str) -> Result<(String, String)> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| AirError::invalid_argument(format!("expected NAME=VALUE, got '{raw}'")))
}

fn parse_payload(raw: &[String]) -> Result<Payload> {
    raw.iter()
        .map(|item| {
            let (name, value) = split_assignment(item)?;
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            Ok((name, value))
        })
        .collect()
}

fn model_json(model: &Model) -> Value {
    Value::Object(model.fields())
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AirError::unexpected(None, format!("failed to render output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn print_config_summary(cfg: &ClientConfig) {
    println!("airctl configuration summary:");
    println!("  api.url                = {}", cfg.api.url);
    println!(
        "  api.credential         = {}",
        if cfg.api.credential().is_some() {
            "<set>"
        } else {
            "<none>"
        }
    );
    println!("  timeouts.connect_secs  = {}", cfg.timeouts.connect_secs);
    println!("  timeouts.read_secs     = {}", cfg.timeouts.read_secs);
    match cfg.timeouts.request_secs {
        Some(secs) => println!("  timeouts.request_secs  = {}", secs),
        None => println!("  timeouts.request_secs  = <transport default>"),
    }
    println!("  pagination.page_size   = {}", cfg.pagination.page_size);
    match cfg.sync.default_flush {
        Some(mode) => println!("  sync.default_flush     = {:?}", mode),
        None => println!("  sync.default_flush     = <per model>"),
    }
    if cfg.sync.models.is_empty() {
        println!("  sync.models            = <none>");
    } else {
        println!("  sync.models:");
        let mut models: Vec<_> = cfg.sync.models.iter().collect();
        models.sort_by(|a, b| a.0.cmp(b.0));
        for (name, mode) in models {
            println!("    - {} = {:?}", name, mode);
        }
    }
}
