use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use validator::Validate;

use crate::{
    AppState,
    analytics::{AnalyticsEvent, EventContext},
    error::AppResult,
};

/// track_event
///
/// [Public Route] Accepts a page view or custom event and forwards it to the
/// analytics provider in the background. Provider failures never reach the
/// visitor.
#[utoipa::path(
    post,
    path = "/api/analytics/event",
    request_body = AnalyticsEvent,
    responses(
        (status = 202, description = "Accepted"),
        (status = 400, description = "Invalid event")
    ),
    tag = "analytics"
)]
pub async fn track_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<AnalyticsEvent>,
) -> AppResult<StatusCode> {
    event.validate()?;

    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let ctx = EventContext {
        user_agent: header_str(header::USER_AGENT.as_str()),
        client_ip: header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string())),
    };

    let analytics = state.analytics.clone();
    tokio::spawn(async move {
        if let Err(e) = analytics.track(&event, &ctx).await {
            tracing::warn!(event = %event.name, error = %e, "analytics provider rejected event");
        }
    });

    Ok(StatusCode::ACCEPTED)
}
