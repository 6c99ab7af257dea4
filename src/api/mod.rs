use axum::{
    Router,
    extract::{Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    Catalog, Context, Diagnostic, FieldKind, Projection, ProjectionError, ProjectionRow,
    coerce_number, default_catalog, fields, run_projection,
};

fn shared_catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(default_catalog)
}

/// A literal override for one catalog field. Text that does not parse as a
/// number coerces to 0, same as catalog text defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum InputValue {
    Number(f64),
    Text(String),
}

impl InputValue {
    fn as_number(&self) -> f64 {
        match self {
            InputValue::Number(v) => *v,
            InputValue::Text(s) => coerce_number(s),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProjectionPayload {
    #[serde(default)]
    inputs: HashMap<String, InputValue>,
    #[serde(default)]
    years: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProjectionQuery {
    years: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ProjectionResponse {
    years: u32,
    rows: Vec<ProjectionRow>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFieldResponse<'a> {
    name: &'a str,
    label: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<&'a str>,
    recurring_expense: bool,
}

#[derive(Debug, Serialize)]
struct CatalogResponse<'a> {
    fields: Vec<CatalogFieldResponse<'a>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn base_context_from_payload(catalog: &Catalog, payload: &ProjectionPayload) -> Context {
    let mut base = catalog.seed_context();
    for (name, value) in &payload.inputs {
        base.set_literal(name, value.as_number());
    }
    if let Some(years) = payload.years {
        base.set_literal(fields::PROJECTION_YEARS, years as f64);
    }
    base
}

fn project_from_payload(payload: &ProjectionPayload) -> Result<Projection, ProjectionError> {
    let catalog = shared_catalog();
    let base = base_context_from_payload(catalog, payload);
    run_projection(catalog, &base)
}

fn catalog_response(catalog: &Catalog) -> CatalogResponse<'_> {
    let fields = catalog
        .fields()
        .iter()
        .map(|field| {
            let (kind, default, text, formula) = match &field.kind {
                FieldKind::Input(v) => ("input", Some(*v), None, None),
                FieldKind::Text(s) => ("text", None, Some(s.as_str()), None),
                FieldKind::Formula(f) => ("formula", None, None, Some(f.source())),
            };
            CatalogFieldResponse {
                name: &field.name,
                label: &field.label,
                kind,
                default,
                text,
                formula,
                recurring_expense: field.recurring_expense,
            }
        })
        .collect();
    CatalogResponse { fields }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/catalog", get(catalog_handler))
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "projection API listening");

    axum::serve(listener, app).await
}

async fn catalog_handler() -> Response {
    Json(catalog_response(shared_catalog())).into_response()
}

async fn projection_get_handler(Query(query): Query<ProjectionQuery>) -> Response {
    let payload = ProjectionPayload {
        inputs: HashMap::new(),
        years: query.years,
    };
    projection_handler_impl(payload).await
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    match project_from_payload(&payload) {
        Ok(projection) => Json(ProjectionResponse {
            years: projection.rows.len() as u32,
            rows: projection.rows,
            diagnostics: projection.diagnostics,
        })
        .into_response(),
        Err(err @ ProjectionError::InvalidHorizon(_)) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
