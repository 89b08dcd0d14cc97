use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

static PROCESS_TRACE_ID: OnceLock<String> = OnceLock::new();

/// JSON events on stdout, one object per line.
pub fn init_tracing() {
    let directive = filter_directive(
        std::env::var("APP_LOG_LEVEL").ok(),
        std::env::var("RUST_LOG").ok(),
    );

    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(EnvFilter::new(directive))
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!(
        component = "bootstrap",
        trace_id = %trace_id(),
        protocol_version = shared_proto::signaling::PROTOCOL_VERSION,
        "structured tracing initialized"
    );
}

fn filter_directive(app_level: Option<String>, rust_log: Option<String>) -> String {
    app_level
        .or(rust_log)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "info,tower_http=debug".to_string())
}

pub fn trace_id() -> &'static str {
    PROCESS_TRACE_ID.get_or_init(|| Uuid::new_v4().to_string())
}
