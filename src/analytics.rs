use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// AnalyticsEvent
///
/// A page view or custom event reported by the public site
/// (POST /api/analytics/event).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct AnalyticsEvent {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(url)]
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    #[ts(type = "Record<string, string | number | boolean> | null")]
    #[schema(value_type = Option<Object>)]
    pub props: Option<BTreeMap<String, serde_json::Value>>,
}

/// Request metadata the provider needs to attribute the event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Analytics provider returned HTTP {0}")]
    HttpStatus(u16),
}

/// AnalyticsService
///
/// Forwards events to the configured analytics provider.
#[async_trait]
pub trait AnalyticsService: Send + Sync {
    async fn track(&self, event: &AnalyticsEvent, ctx: &EventContext)
    -> Result<(), AnalyticsError>;
}

/// HttpAnalytics
///
/// Posts events to a Plausible-style `/api/event` endpoint.
pub struct HttpAnalytics {
    client: reqwest::Client,
    endpoint: String,
    domain: String,
}

impl HttpAnalytics {
    pub fn new(endpoint: String, domain: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            domain,
        }
    }

    fn payload(&self, event: &AnalyticsEvent) -> serde_json::Value {
        json!({
            "name": event.name,
            "url": event.url,
            "domain": self.domain,
            "referrer": event.referrer,
            "props": event.props,
        })
    }
}

#[async_trait]
impl AnalyticsService for HttpAnalytics {
    async fn track(
        &self,
        event: &AnalyticsEvent,
        ctx: &EventContext,
    ) -> Result<(), AnalyticsError> {
        let mut request = self.client.post(&self.endpoint).json(&self.payload(event));
        if let Some(ua) = &ctx.user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }
        if let Some(ip) = &ctx.client_ip {
            request = request.header("x-forwarded-for", ip);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AnalyticsError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

/// NoopAnalytics
///
/// Used when no analytics endpoint is configured; events are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsService for NoopAnalytics {
    async fn track(
        &self,
        event: &AnalyticsEvent,
        _ctx: &EventContext,
    ) -> Result<(), AnalyticsError> {
        tracing::debug!(name = %event.name, url = %event.url, "analytics event (no provider)");
        Ok(())
    }
}
