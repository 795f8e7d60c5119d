use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod retry;
pub mod search;
pub mod seo;
pub mod storage;

// Module for routing segregation (Public, Authenticated, Staff/Admin, SEO).
pub mod routes;
use auth::{AuthUser, RequireAdmin, RequireStaff};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use analytics::{AnalyticsService, HttpAnalytics, NoopAnalytics};
pub use cache::TtlCache;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{PostgresRepository, Repository, RepositoryState};
pub use retry::RetryPolicy;
pub use search::{AiSearchClient, KeywordSearch, SearchHit, SearchService};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// The generated OpenAPI document, served at `/api-docs/openapi.json` and
/// browsable through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login, handlers::auth::register, handlers::auth::logout,
        handlers::auth::get_me, handlers::auth::update_me, handlers::auth::change_password,
        handlers::posts::list_posts, handlers::posts::get_post, handlers::posts::create_post,
        handlers::posts::update_post, handlers::posts::delete_post,
        handlers::content::list_projects, handlers::content::get_project,
        handlers::content::create_project, handlers::content::update_project,
        handlers::content::delete_project, handlers::content::list_services,
        handlers::content::get_service, handlers::content::create_service,
        handlers::content::update_service, handlers::content::delete_service,
        handlers::forms::get_public_form, handlers::forms::submit_form,
        handlers::forms::list_forms, handlers::forms::create_form, handlers::forms::update_form,
        handlers::forms::delete_form, handlers::forms::list_entries,
        handlers::forms::update_entry, handlers::forms::delete_entry,
        handlers::media::create_upload_url, handlers::media::register_media,
        handlers::media::list_media, handlers::media::update_media, handlers::media::delete_media,
        handlers::users::list_users, handlers::users::create_user, handlers::users::update_user,
        handlers::users::delete_user,
        handlers::settings::public_settings, handlers::settings::list_settings,
        handlers::settings::update_settings, handlers::settings::get_stats,
        handlers::search::search, handlers::analytics::track_event,
        handlers::seo::sitemap, handlers::seo::robots, handlers::seo::manifest,
    ),
    components(
        schemas(
            models::Role, models::PostStatus, models::FormStatus, models::EntryStatus,
            models::User, models::Post, models::Form, models::FormEntry, models::Media,
            models::Project, models::Service, models::Setting, models::DashboardStats,
            models::LoginRequest, models::RegisterRequest, models::SessionResponse,
            models::CreateUserRequest, models::UpdateUserRequest, models::UpdateProfileRequest,
            models::ChangePasswordRequest, models::CreatePostRequest, models::UpdatePostRequest,
            models::CreateFormRequest, models::UpdateFormRequest, models::SubmitFormRequest,
            models::SubmitFormResponse, models::UpdateEntryRequest, models::UploadUrlRequest,
            models::UploadUrlResponse, models::CreateMediaRequest, models::UpdateMediaRequest,
            models::CreateProjectRequest, models::UpdateProjectRequest,
            models::CreateServiceRequest, models::UpdateServiceRequest,
            forms::FieldKind, forms::FieldOption, forms::FormField, forms::FieldError,
            forms::RenderedForm, forms::RenderedField,
            search::DocumentKind, search::SearchHit, search::SearchResponse,
            analytics::AnalyticsEvent,
        )
    ),
    tags(
        (name = "auth", description = "Sessions and self-service"),
        (name = "content", description = "Posts, projects and services"),
        (name = "forms", description = "Form builder, rendering and submissions"),
        (name = "media", description = "Media library and uploads"),
        (name = "users", description = "User administration"),
        (name = "settings", description = "Site settings and dashboard"),
        (name = "search", description = "Site search"),
        (name = "analytics", description = "Analytics events"),
        (name = "seo", description = "Sitemap, robots and manifest"),
    )
)]
struct ApiDoc;

pub type SearchState = Arc<dyn SearchService>;
pub type AnalyticsState = Arc<dyn AnalyticsService>;

/// AppState
///
/// The single shared application state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
    /// Result ranking: AI-backed when configured, keyword otherwise.
    pub search: SearchState,
    pub analytics: AnalyticsState,
    /// Memoized search results keyed by normalized query and limit.
    pub search_cache: Arc<TtlCache<Vec<SearchHit>>>,
    /// Backoff applied to read queries.
    pub retry: RetryPolicy,
}

impl AppState {
    /// Builds the state, choosing the search and analytics providers from
    /// the configuration.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let search: SearchState = match &config.ai_search_url {
            Some(url) => Arc::new(AiSearchClient::new(
                url.clone(),
                config.ai_search_key.clone(),
                config.ai_search_model.clone(),
            )),
            None => Arc::new(KeywordSearch),
        };
        let analytics: AnalyticsState = match &config.analytics_url {
            Some(url) => Arc::new(HttpAnalytics::new(
                url.clone(),
                config.analytics_domain.clone(),
            )),
            None => Arc::new(NoopAnalytics),
        };

        Self {
            search_cache: Arc::new(TtlCache::new(config.search_cache_ttl())),
            repo,
            storage,
            config,
            search,
            analytics,
            retry: RetryPolicy::default(),
        }
    }

    /// Drops memoized search results after a content change.
    pub fn invalidate_search(&self) {
        self.search_cache.clear();
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated tier: the `AuthUser` extractor rejects with 401
/// before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// staff_middleware
///
/// Gate for the back office: 401 without a session, 403 unless admin or editor.
async fn staff_middleware(_staff: RequireStaff, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Gate for user administration: 403 unless admin.
async fn admin_middleware(_admin: RequireAdmin, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tiers under `/api`, the crawler files at the root,
/// the Swagger UI, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router Assembly
    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            admin::staff_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), staff_middleware)),
        )
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), admin_middleware)),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::seo::seo_routes())
        .nest("/api", api)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// method, URI and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
