use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, reload, EnvFilter, Layer, Registry};

static RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static DEFAULT_LOG_LEVEL: OnceLock<String> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(level)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber writing to stderr. `RUST_LOG` takes
/// precedence over `level`. Returns false if a subscriber was already
/// installed.
pub fn init(level: LogLevel, format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let (filter, handle) = reload::Layer::new(env_filter);

    // stdout is reserved for program output.
    let output = match format {
        LogFormat::Text => fmt_layer::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt_layer::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok();

    if installed {
        set_reload_handle(handle);
        set_default_log_level(level.to_string());
    }
    installed
}

pub fn set_reload_handle(handle: reload::Handle<EnvFilter, Registry>) {
    if RELOAD_HANDLE.set(handle).is_err() {
        eprintln!("ERROR: Failed to set the reload handle");
    }
}

pub fn set_default_log_level(level: String) {
    if DEFAULT_LOG_LEVEL.set(level).is_err() {
        eprintln!("ERROR: Failed to set the default log level");
    }
}

/// Go back to the level given to [`init`].
pub fn reset() {
    let log_level = DEFAULT_LOG_LEVEL
        .get()
        .map(String::as_str)
        .unwrap_or("info");

    reload_env_filter(EnvFilter::new(log_level));
}

pub fn reload(log_level: LogLevel) {
    let env_filter = EnvFilter::new(log_level.to_string());
    reload_env_filter(env_filter);
}

fn reload_env_filter(env_filter: EnvFilter) {
    tracing::info!("Reloading log level: {env_filter}");

    if let Some(handle) = RELOAD_HANDLE.get() {
        if let Err(e) = handle.reload(env_filter) {
            tracing::error!("Failed to reload the log level: {e}");
        }
    } else {
        tracing::error!("ERROR: Failed to get the reload handle");
    }
}
