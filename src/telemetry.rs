use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when `RUST_LOG` is unset: loader progress at info, sqlx chatter muted.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. `LOG_FORMAT=compact` switches to the single-line compact formatter.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let compact = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("compact"))
        .unwrap_or(false);

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let res = if compact {
        builder.compact().try_init()
    } else {
        builder.with_line_number(true).with_file(true).try_init()
    };
    res.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
