use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes console logging: an `EnvFilter` honoring `RUST_LOG` (falling
/// back to "info"), plus a `fmt` layer with target and line numbers.
///
/// Grounded on `adk-telemetry::init_internal`'s console path, trimmed to
/// the one backend this binary needs — OTLP/LangSmith export is the
/// teacher's concern, not this chat core's.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
