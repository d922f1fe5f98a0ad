// src/lambda/mod.rs

//! AWS Lambda handler for the collector.
//!
//! The function sits behind an HTTP trigger (function URL or API gateway)
//! fired by a cron scheduler. Each invocation:
//! 1. Checks `Authorization: Bearer <CRON_SECRET>`
//! 2. Runs one collection pass on the shared [`Collector`]
//! 3. Answers 200, 401 or 500 in the proxy response shape
//!
//! The collector, and with it the lazily connected database pool, is built
//! once per cold start and reused by every warm invocation.

use std::collections::HashMap;
use std::time::Instant;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, instrument};

use crate::error::AppError;
use crate::pipeline::Collector;

/// HTTP-style invocation payload. Only the headers matter.
#[derive(Debug, Default, Deserialize)]
pub struct InvocationRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: HashMap<String, String>,
}

/// REST proxy events carry `"headers": null` when the request has none.
fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl InvocationRequest {
    /// Case-insensitive `Authorization` header lookup.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }
}

/// Proxy-integration response.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }
}

/// Main Lambda handler function.
#[instrument(skip(collector, event))]
pub async fn handler(
    collector: &Collector,
    event: LambdaEvent<InvocationRequest>,
) -> std::result::Result<InvocationResponse, LambdaError> {
    let (request, _context) = event.into_parts();
    Ok(respond(collector, &request).await)
}

/// Run the collector for one request and map the outcome to a response.
pub async fn respond(collector: &Collector, request: &InvocationRequest) -> InvocationResponse {
    let start = Instant::now();

    match collector.handle(request.authorization()).await {
        Ok(report) => {
            info!(
                "Collector ran successfully in {}ms: {} stations, {} changed",
                start.elapsed().as_millis(),
                report.stations,
                report.changed
            );
            InvocationResponse::new(200, "Collector ran successfully")
        }
        Err(e) if e.is_unauthorized() => {
            info!("Rejected unauthorized invocation");
            InvocationResponse::new(401, "Unauthorized")
        }
        Err(e) => {
            error!("Error in poll: {}", e);
            let message = match &e {
                AppError::Run { source, .. } if matches!(**source, AppError::Config(_)) => {
                    source.to_string()
                }
                _ => format!("Error: {}", e),
            };
            InvocationResponse::new(500, message)
        }
    }
}
