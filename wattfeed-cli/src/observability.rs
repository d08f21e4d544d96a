//! Process-wide logging setup.

use std::sync::Once;

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    /// One JSON object per line, for CI and cluster log collectors.
    Json,
    /// Human-readable lines for local runs.
    Text,
}

/// Format requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatChoice {
    /// JSON under CI or Kubernetes, text otherwise.
    #[default]
    Auto,
    /// Always JSON.
    Json,
    /// Always text.
    Text,
}

impl LogFormatChoice {
    /// Settle `Auto` by inspecting the environment through `env`.
    pub(crate) fn resolve<F>(self, env: F) -> LogFormat
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Text => LogFormat::Text,
            LogFormatChoice::Auto => detect(env),
        }
    }
}

fn detect<F>(env: F) -> LogFormat
where
    F: Fn(&str) -> Option<String>,
{
    let is_true = |name: &str| env(name).is_some_and(|value| value == "true");
    let in_cluster = env("KUBERNETES_SERVICE_HOST").is_some_and(|value| !value.is_empty());

    if is_true("GITHUB_ACTIONS") || is_true("CI") || in_cluster {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` overrides the default `info` level.
pub(crate) fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_target(false))
                    .init();
            }
        }
    });
}
