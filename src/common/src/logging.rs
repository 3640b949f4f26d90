//! Structured logging vocabulary shared by all node services.
//!
//! `tracing` field names are literals at the call site, so the keys below
//! are the contract: events must use exactly these names. Tests and log
//! pipelines match on them.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Identifier shared by every event of one operation.
pub const TRACE_ID_KEY: &str = "trace_id";
/// Name of the operation, e.g. `retention.delete_check`.
pub const OPERATION_NAME_KEY: &str = "op_name";
/// Marks the first and last event of an operation.
pub const OPERATION_EVENT_KEY: &str = "op_event";
/// Wall time an operation took, set on its end event.
pub const OPERATION_ELAPSED_KEY: &str = "op_elapsed";
pub const DB_INSTANCE_KEY: &str = "db_instance";
pub const DB_RETENTION_KEY: &str = "db_rp";
pub const DB_SHARD_GROUP_KEY: &str = "db_shard_group";
pub const DB_SHARD_ID_KEY: &str = "db_shard_id";

/// Value of the `op_event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationEvent {
    Start,
    End,
}

impl OperationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationEvent::Start => "evt.start",
            OperationEvent::End => "evt.end",
        }
    }
}

impl fmt::Display for OperationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh trace identifier.
pub fn next_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Open the span every event of one operation is recorded under.
pub fn operation_span(name: &'static str, trace_id: &str) -> tracing::Span {
    tracing::info_span!("operation", trace_id = %trace_id, op_name = name)
}

/// Install the global subscriber for a node binary.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {e}");
    }
}
