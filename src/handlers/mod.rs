//! HTTP handlers, one module per resource. Every handler follows the same
//! shape: extract → validate → repository call → response, returning
//! `AppResult` so failures render through `AppError`.

pub mod analytics;
pub mod auth;
pub mod content;
pub mod forms;
pub mod media;
pub mod posts;
pub mod search;
pub mod seo;
pub mod settings;
pub mod users;

use uuid::Uuid;

/// Path segment that may be either a UUID or a slug (`/api/posts/{id}`).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IdOrSlug {
    Id(Uuid),
    Slug(String),
}

impl IdOrSlug {
    pub(crate) fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => IdOrSlug::Id(id),
            Err(_) => IdOrSlug::Slug(raw.to_string()),
        }
    }
}

/// Empty strings from optional inputs mean "not set".
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
