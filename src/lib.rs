// Legacy Tax Audit - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod audit;
pub mod config;
pub mod error;
pub mod external;
pub mod logging;
pub mod parser;
pub mod records;

// Re-export commonly used types
pub use audit::{run_audit, AuditEngine, AuditReason, AuditReport, AuditSubject, SuspiciousRecord};
pub use config::{AuditSettings, Settings, TransformSettings};
pub use error::{ConfigError, ParseError, RecordError};
pub use external::{external_check, ExternalCheckResult, FederalRegistry, SimulatedRegistry};
pub use parser::{
    legacy_to_modern, legacy_to_modern_at, parse_fixed_text, reformat_identifier,
    FormattedIdentifier, ParsedFields, Transformer,
};
pub use records::{
    legacy_records_from_json, load_legacy_csv, read_legacy_csv, EntryStatus, LegacyEntry,
    LegacyRecord, ModernEntry, RawAmount, TaxId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
