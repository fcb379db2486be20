//! Log setup for the gateway.
//!
//! Logs are written with `tracing-subscriber`, either human-readable or as JSON lines.
//! The filter is installed behind a reload layer so that `gateway.debug = true` in the
//! config file can raise verbosity after the config has been parsed.

use clap::ValueEnum;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

use crate::error::{Error, ErrorDetails};

const DEFAULT_DIRECTIVES: &str = "warn,gateway=info,textclass_internal=info";
const DEBUG_DIRECTIVES: &str = "warn,gateway=debug,textclass_internal=debug,tower_http=debug";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

type FmtLayer = Box<dyn Layer<Registry> + Send + Sync>;
type FilterHandle = reload::Handle<EnvFilter, Layered<FmtLayer, Registry>>;

/// Handle for turning on debug logs once the config file is known.
pub struct DelayedDebugLogs {
    handle: FilterHandle,
    // `RUST_LOG` always wins over the config file
    env_filter_set: bool,
}

impl DelayedDebugLogs {
    pub fn enable_debug(&self) -> Result<(), Error> {
        if self.env_filter_set {
            tracing::info!("`RUST_LOG` is set, so `gateway.debug` does not change the log filter");
            return Ok(());
        }
        self.handle
            .reload(EnvFilter::new(DEBUG_DIRECTIVES))
            .map_err(|e| {
                Error::new(ErrorDetails::Config {
                    message: format!("Failed to enable debug logs: {e}"),
                })
            })
    }
}

pub struct DelayedLogConfig {
    pub delayed_debug_logs: DelayedDebugLogs,
}

/// Install the global `tracing` subscriber. Must be called once, before anything logs.
pub fn setup_observability(log_format: LogFormat) -> Result<DelayedLogConfig, Error> {
    let (env_filter, env_filter_set) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(DEFAULT_DIRECTIVES), false),
    };
    let (filter, handle) = reload::Layer::new(env_filter);

    let fmt_layer: FmtLayer = match log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to initialize tracing subscriber: {e}"),
            })
        })?;

    Ok(DelayedLogConfig {
        delayed_debug_logs: DelayedDebugLogs {
            handle,
            env_filter_set,
        },
    })
}
