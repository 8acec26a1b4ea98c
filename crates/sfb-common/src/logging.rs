//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Shared configuration and tracing bootstrap."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Environment variables consulted for the filter, in precedence order.
const FILTER_VARS: [&str; 2] = ["SFB_LOG", "RUST_LOG"];
const FALLBACK_FILTER: &str = "info";

/// Writer guards for the process lifetime. The first successful init keeps them.
static WRITER_GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console output style. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

struct FilterChoice {
    filter: EnvFilter,
    source: &'static str,
    rejected: Option<String>,
}

/// Pick the first parseable directive among `FILTER_VARS`.
fn resolve_filter(lookup: impl Fn(&str) -> Option<String>) -> FilterChoice {
    let mut rejected = None;
    for var in FILTER_VARS {
        let Some(directive) = lookup(var) else {
            continue;
        };
        match EnvFilter::try_new(&directive) {
            Ok(filter) => {
                return FilterChoice {
                    filter,
                    source: var,
                    rejected,
                }
            }
            Err(err) => {
                rejected.get_or_insert(format!("{var}={directive:?}: {err}"));
            }
        }
    }
    FilterChoice {
        filter: EnvFilter::new(FALLBACK_FILTER),
        source: "default",
        rejected,
    }
}

fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let stem = config
        .file_prefix
        .as_deref()
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(service_name);
    format!("{stem}.log")
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

/// Install the global subscriber: console output in the configured format plus
/// a daily rolling JSON file under `config.directory`.
///
/// The filter comes from `SFB_LOG`, then `RUST_LOG`, then `info`. A directive
/// that does not parse is skipped and reported once the subscriber is up.
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;

    let appender = daily(&config.directory, log_file_name(service_name, config));
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = WRITER_GUARDS.set((file_guard, stdout_guard));

    let choice = resolve_filter(|var| std::env::var(var).ok());

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    let installed = tracing_subscriber::registry()
        .with(choice.filter)
        .with(console_layer(config.format, stdout_writer))
        .with(file_layer)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }

    if let Some(rejected) = choice.rejected {
        warn!(%rejected, "ignored log filter directive");
    }
    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        filter_source = choice.source,
        "tracing initialised"
    );
    Ok(())
}
