// Legacy Tax Audit - Web Server
// REST API over the parser, transformer, audit engine and federal registry

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use legacy_audit::{
    external_check, legacy_records_from_json, logging, parse_fixed_text, AuditEngine, AuditReport,
    ExternalCheckResult, FederalRegistry, LegacyEntry, LegacyRecord, ModernEntry, ParsedFields,
    Settings, SimulatedRegistry, Transformer,
};

/// Characters of the raw input echoed back in transform responses
const PREVIEW_CHARS: usize = 100;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "legacy-audit-server")]
#[command(about = "REST API for legacy tax record transformation and audit")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    audit: Arc<AuditEngine>,
    transformer: Arc<Transformer>,
    registry: Arc<dyn FederalRegistry>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    warn!("{} {}", status, message);
    (
        status,
        Json(ApiResponse {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message),
        }),
    )
        .into_response()
}

/// Transform request
#[derive(Deserialize)]
struct RawInput {
    raw_data: String,
}

/// Transform response
#[derive(Serialize)]
struct TransformedResponse {
    id: uuid::Uuid,
    timestamp: DateTime<Utc>,
    parsed_data: ParsedFields,
    preview: String,
}

fn preview(raw: &str) -> String {
    if raw.chars().count() > PREVIEW_CHARS {
        let head: String = raw.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        raw.to_string()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/transform - Parse one fixed-format legacy line
async fn transform(Json(input): Json<RawInput>) -> Response {
    let raw = input.raw_data.trim();

    match parse_fixed_text(raw) {
        Ok(parsed) => {
            let response = TransformedResponse {
                id: uuid::Uuid::new_v4(),
                timestamp: Utc::now(),
                parsed_data: parsed,
                preview: preview(raw),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => failure(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// POST /api/modernize - Convert one legacy record into a modern record
async fn modernize(State(state): State<AppState>, Json(record): Json<LegacyRecord>) -> Response {
    match LegacyEntry::try_from(record) {
        Ok(entry) => {
            let modern: ModernEntry = state.transformer.to_modern(&entry);
            (StatusCode::OK, Json(ApiResponse::ok(modern))).into_response()
        }
        Err(e) => failure(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// POST /api/audit - Audit a batch of legacy records
///
/// Elements are read one by one so a malformed record becomes a finding
/// rather than rejecting the whole batch.
async fn audit(
    State(state): State<AppState>,
    Json(batch): Json<Vec<serde_json::Value>>,
) -> impl IntoResponse {
    let records = legacy_records_from_json(batch);
    let report: AuditReport = state.audit.run(&records);
    (StatusCode::OK, Json(ApiResponse::ok(report)))
}

/// GET /api/external/:tax_id - Registry validation, score and debts
async fn external(State(state): State<AppState>, Path(tax_id): Path<String>) -> Response {
    // Decode URL-encoded identifier
    let decoded = urlencoding::decode(&tax_id)
        .unwrap_or_else(|_| tax_id.clone().into())
        .into_owned();

    match external_check(state.registry.as_ref(), &decoded) {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::<ExternalCheckResult>::ok(result))).into_response(),
        Err(e) => failure(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transform", post(transform))
        .route("/modernize", post(modernize))
        .route("/audit", post(audit))
        .route("/external/:tax_id", get(external))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    logging::init(&settings.logging.level);

    let state = AppState {
        audit: Arc::new(AuditEngine::with_settings(&settings.audit)),
        transformer: Arc::new(Transformer::new(&settings.transform)),
        registry: Arc::new(SimulatedRegistry::new()),
    };

    let app = create_router(state);

    let addr = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Legacy audit API listening on http://{}/api", addr);

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_input() {
        let long = "x".repeat(150);
        let shown = preview(&long);
        assert_eq!(shown.len(), PREVIEW_CHARS + 3);
        assert!(shown.ends_with("..."));

        assert_eq!(preview("NOME: Ana"), "NOME: Ana");
    }
}
