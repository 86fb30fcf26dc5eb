//! HTTP request handlers.

use super::types::{
    ApiResponse, CodeData, CodeQuery, HealthResponse, HistoryQuery, ReceiveData,
};
use super::AppState;
use crate::error::GatewayError;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use sms_code::{LookupOutcome, MessageRecord, NewMessage};
use tracing::{debug, info};

/// Characters of the message body echoed back with a found code.
const EXCERPT_CHARS: usize = 50;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, GatewayError> {
    let record_count = state.service.count().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        record_count,
    }))
}

/// Store a forwarded SMS.
pub async fn receive_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<NewMessage>,
) -> Result<Json<ApiResponse<ReceiveData>>, GatewayError> {
    state.api_key.check(&headers)?;

    let record = state.service.ingest(message).await?;

    Ok(Json(ApiResponse::ok(
        "SMS received",
        Some(ReceiveData {
            id: record.id,
            extracted_code: record.extracted_code,
            phone_number: record.extracted_phone_number,
        }),
    )))
}

/// Wait for the latest verification code sent to a phone number.
pub async fn get_code(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<ApiResponse<CodeData>>, GatewayError> {
    let keyword = query
        .platform_keyword
        .as_deref()
        .filter(|k| !k.is_empty());
    let wait_timeout = query.wait_timeout.unwrap_or(state.default_wait_timeout);

    info!(keyword = ?keyword, wait_timeout, "Code lookup request received");
    debug!(phone_number = %query.phone_number, "Code lookup target");

    let outcome = state
        .service
        .lookup(&query.phone_number, keyword, wait_timeout)
        .await?;

    let resolution = match outcome {
        LookupOutcome::Found(resolution) => resolution,
        LookupOutcome::TimedOut => {
            info!(wait_timeout, "Code lookup timed out");
            return Ok(Json(ApiResponse::timeout()));
        }
    };

    let matched_by = if keyword.is_some() { "keyword" } else { "fallback" };

    Ok(Json(ApiResponse::ok(
        "Verification code found",
        Some(CodeData {
            code: resolution.code,
            matched_by: matched_by.to_string(),
            sms_excerpt: resolution.record.excerpt(EXCERPT_CHARS),
            received_time: resolution.record.receive_time.to_rfc3339(),
        }),
    )))
}

/// List stored messages, newest first.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageRecord>>, GatewayError> {
    let records = state.service.history(query.limit, query.offset).await?;
    Ok(Json(records))
}

/// Get a single stored message.
pub async fn get_sms(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageRecord>, GatewayError> {
    let record = state
        .service
        .get(id)
        .await?
        .ok_or(GatewayError::NotFound(id))?;

    Ok(Json(record))
}

/// Delete a stored message.
pub async fn delete_sms(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, GatewayError> {
    state.api_key.check(&headers)?;

    if !state.service.delete(id).await? {
        return Err(GatewayError::NotFound(id));
    }

    Ok(Json(ApiResponse::ok("SMS record deleted", None)))
}
