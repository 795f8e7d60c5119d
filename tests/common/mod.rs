#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;
use tower::ServiceExt;
use uuid::Uuid;

use site_backoffice::{
    AppState, SearchState, create_router,
    auth::issue_token,
    config::AppConfig,
    models::{
        CreateFormRequest, CreateMediaRequest, CreateProjectRequest, CreateServiceRequest,
        DashboardStats, EntryStatus, Form, FormEntry, FormStatus, Media, NewFormEntry, NewPost,
        NewUser, Post, PostChanges, PostStatus, Project, Role, Service, Setting, SettingsMap,
        UpdateFormRequest, UpdateProjectRequest, UpdateServiceRequest, User, UserCredentials,
    },
    password::hash_password,
    repository::{AdminGuard, PostQuery, RepoResult, Repository, RepositoryState},
    storage::{MockStorageService, StorageState},
};

pub const TEST_PASSWORD: &str = "correct-horse-battery";

// --- IN-MEMORY REPOSITORY ---

#[derive(Default)]
struct Store {
    users: Vec<UserCredentials>,
    posts: Vec<Post>,
    forms: Vec<Form>,
    entries: Vec<FormEntry>,
    media: Vec<Media>,
    projects: Vec<Project>,
    services: Vec<Service>,
    settings: BTreeMap<String, Setting>,
}

impl Store {
    fn is_last_admin(&self, id: Uuid) -> bool {
        let admins: Vec<Uuid> = self
            .users
            .iter()
            .filter(|u| u.role == "admin")
            .map(|u| u.id)
            .collect();
        admins == [id]
    }
}

/// Vector-backed `Repository` mirroring the Postgres semantics the handlers
/// rely on: COALESCE-style partial updates, empty strings clearing nullable
/// text, first-publication stamping and the listing orders.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

fn clear_or_keep(current: Option<String>, change: Option<String>) -> Option<String> {
    match change {
        None => current,
        Some(value) if value.is_empty() => None,
        Some(value) => Some(value),
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries_for(&self, form_id: Uuid) -> Vec<FormEntry> {
        let store = self.store.lock().unwrap();
        store
            .entries
            .iter()
            .filter(|e| e.form_id == form_id)
            .cloned()
            .collect()
    }

    pub fn media_count(&self) -> usize {
        self.store.lock().unwrap().media.len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- Users ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .map(UserCredentials::into_user))
    }

    async fn get_credentials(&self, id: Uuid) -> RepoResult<Option<UserCredentials>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_credentials_by_email(&self, email: &str) -> RepoResult<Option<UserCredentials>> {
        let email = email.trim().to_lowercase();
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let record = UserCredentials {
            id: Uuid::new_v4(),
            email: user.email.trim().to_lowercase(),
            name: user.name,
            role: user.role.as_str().to_string(),
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().users.push(record.clone());
        Ok(record.into_user())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().cloned().map(UserCredentials::into_user).collect())
    }

    async fn update_user(
        &self,
        id: Uuid,
        name: Option<String>,
        role: Option<Role>,
    ) -> RepoResult<AdminGuard<User>> {
        let mut store = self.store.lock().unwrap();
        if role.is_some_and(|r| r != Role::Admin) && store.is_last_admin(id) {
            return Ok(AdminGuard::LastAdmin);
        }
        let Some(user) = store.users.iter_mut().find(|u| u.id == id) else {
            return Ok(AdminGuard::NotFound);
        };
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(role) = role {
            user.role = role.as_str().to_string();
        }
        Ok(AdminGuard::Applied(user.clone().into_user()))
    }

    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        match store.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.password_hash = password_hash;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<AdminGuard<()>> {
        let mut store = self.store.lock().unwrap();
        if store.is_last_admin(id) {
            return Ok(AdminGuard::LastAdmin);
        }
        let before = store.users.len();
        store.users.retain(|u| u.id != id);
        for post in store.posts.iter_mut().filter(|p| p.author_id == Some(id)) {
            post.author_id = None;
        }
        Ok(if store.users.len() < before {
            AdminGuard::Applied(())
        } else {
            AdminGuard::NotFound
        })
    }

    async fn count_admins(&self) -> RepoResult<i64> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().filter(|u| u.role == "admin").count() as i64)
    }

    // --- Posts ---

    async fn list_posts(&self, query: &PostQuery) -> RepoResult<(Vec<Post>, i64)> {
        let store = self.store.lock().unwrap();
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<Post> = store
            .posts
            .iter()
            .filter(|p| query.status.is_none_or(|s| p.status == s.as_str()))
            .filter(|p| query.tag.as_ref().is_none_or(|t| p.tags.contains(t)))
            .filter(|p| {
                needle.as_ref().is_none_or(|n| {
                    p.title.to_lowercase().contains(n)
                        || p.excerpt.to_lowercase().contains(n)
                        || p.content.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.published_at
                .unwrap_or(b.updated_at)
                .cmp(&a.published_at.unwrap_or(a.updated_at))
                .then(b.created_at.cmp(&a.created_at))
        });
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let store = self.store.lock().unwrap();
        Ok(store.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>> {
        let store = self.store.lock().unwrap();
        Ok(store.posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn create_post(&self, post: NewPost) -> RepoResult<Post> {
        let now = Utc::now();
        let record = Post {
            id: Uuid::new_v4(),
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt,
            content: post.content,
            cover_image: post.cover_image,
            tags: post.tags,
            status: post.status.as_str().to_string(),
            author_id: post.author_id,
            reading_minutes: post.reading_minutes,
            published_at: (post.status == PostStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };
        self.store.lock().unwrap().posts.push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>> {
        let mut store = self.store.lock().unwrap();
        let Some(post) = store.posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(slug) = changes.slug {
            post.slug = slug;
        }
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(excerpt) = changes.excerpt {
            post.excerpt = excerpt;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        post.cover_image = clear_or_keep(post.cover_image.take(), changes.cover_image);
        if let Some(tags) = changes.tags {
            post.tags = tags;
        }
        if let Some(minutes) = changes.reading_minutes {
            post.reading_minutes = minutes;
        }
        if let Some(status) = changes.status {
            post.status = status.as_str().to_string();
        }
        post.updated_at = Utc::now();
        if post.is_published() && post.published_at.is_none() {
            post.published_at = Some(post.updated_at);
        }
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.posts.len();
        store.posts.retain(|p| p.id != id);
        Ok(store.posts.len() < before)
    }

    // --- Forms & Entries ---

    async fn list_forms(&self) -> RepoResult<Vec<Form>> {
        let store = self.store.lock().unwrap();
        let mut forms = store.forms.clone();
        forms.reverse();
        Ok(forms)
    }

    async fn get_form(&self, id: Uuid) -> RepoResult<Option<Form>> {
        let store = self.store.lock().unwrap();
        Ok(store.forms.iter().find(|f| f.id == id).cloned())
    }

    async fn get_form_by_slug(&self, slug: &str) -> RepoResult<Option<Form>> {
        let store = self.store.lock().unwrap();
        Ok(store.forms.iter().find(|f| f.slug == slug).cloned())
    }

    async fn create_form(&self, slug: String, req: CreateFormRequest) -> RepoResult<Form> {
        let now = Utc::now();
        let form = Form {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            slug,
            description: req.description,
            fields: Json(req.fields),
            status: req.status.unwrap_or(FormStatus::Active).as_str().to_string(),
            submit_label: req.submit_label.unwrap_or_else(|| "Submit".to_string()),
            success_message: req
                .success_message
                .unwrap_or_else(|| "Thanks, we will be in touch.".to_string()),
            created_at: now,
            updated_at: now,
        };
        self.store.lock().unwrap().forms.push(form.clone());
        Ok(form)
    }

    async fn update_form(&self, id: Uuid, req: UpdateFormRequest) -> RepoResult<Option<Form>> {
        let mut store = self.store.lock().unwrap();
        let Some(form) = store.forms.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            form.name = name;
        }
        if let Some(slug) = req.slug {
            form.slug = slug;
        }
        form.description = clear_or_keep(form.description.take(), req.description);
        if let Some(fields) = req.fields {
            form.fields = Json(fields);
        }
        if let Some(status) = req.status {
            form.status = status.as_str().to_string();
        }
        if let Some(label) = req.submit_label {
            form.submit_label = label;
        }
        if let Some(message) = req.success_message {
            form.success_message = message;
        }
        form.updated_at = Utc::now();
        Ok(Some(form.clone()))
    }

    async fn delete_form(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.forms.len();
        store.forms.retain(|f| f.id != id);
        store.entries.retain(|e| e.form_id != id);
        Ok(store.forms.len() < before)
    }

    async fn create_entry(&self, entry: NewFormEntry) -> RepoResult<FormEntry> {
        let record = FormEntry {
            id: Uuid::new_v4(),
            form_id: entry.form_id,
            data: entry.data,
            status: EntryStatus::New.as_str().to_string(),
            source_page: entry.source_page,
            user_agent: entry.user_agent,
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().entries.push(record.clone());
        Ok(record)
    }

    async fn list_entries(
        &self,
        form_id: Uuid,
        status: Option<EntryStatus>,
    ) -> RepoResult<Vec<FormEntry>> {
        let store = self.store.lock().unwrap();
        Ok(store
            .entries
            .iter()
            .rev()
            .filter(|e| e.form_id == form_id)
            .filter(|e| status.is_none_or(|s| e.status == s.as_str()))
            .cloned()
            .collect())
    }

    async fn update_entry_status(
        &self,
        id: Uuid,
        status: EntryStatus,
    ) -> RepoResult<Option<FormEntry>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.entries.iter_mut().find(|e| e.id == id).map(|entry| {
            entry.status = status.as_str().to_string();
            entry.clone()
        }))
    }

    async fn delete_entry(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.entries.len();
        store.entries.retain(|e| e.id != id);
        Ok(store.entries.len() < before)
    }

    // --- Media ---

    async fn list_media(&self) -> RepoResult<Vec<Media>> {
        let store = self.store.lock().unwrap();
        Ok(store.media.iter().rev().cloned().collect())
    }

    async fn create_media(
        &self,
        req: CreateMediaRequest,
        url: String,
        uploaded_by: Uuid,
    ) -> RepoResult<Media> {
        let media = Media {
            id: Uuid::new_v4(),
            key: req.key,
            url,
            filename: req.filename,
            mime_type: req.mime_type,
            size_bytes: req.size_bytes,
            alt_text: req.alt_text,
            uploaded_by: Some(uploaded_by),
            created_at: Utc::now(),
        };
        self.store.lock().unwrap().media.push(media.clone());
        Ok(media)
    }

    async fn update_media(&self, id: Uuid, alt_text: Option<String>) -> RepoResult<Option<Media>> {
        let mut store = self.store.lock().unwrap();
        Ok(store.media.iter_mut().find(|m| m.id == id).map(|media| {
            media.alt_text = alt_text.filter(|a| !a.is_empty());
            media.clone()
        }))
    }

    async fn delete_media(&self, id: Uuid) -> RepoResult<Option<Media>> {
        let mut store = self.store.lock().unwrap();
        let position = store.media.iter().position(|m| m.id == id);
        Ok(position.map(|index| store.media.remove(index)))
    }

    // --- Projects ---

    async fn list_projects(
        &self,
        published_only: bool,
        featured_only: bool,
    ) -> RepoResult<Vec<Project>> {
        let store = self.store.lock().unwrap();
        let mut projects: Vec<Project> = store
            .projects
            .iter()
            .filter(|p| !published_only || p.published)
            .filter(|p| !featured_only || p.featured)
            .cloned()
            .collect();
        projects.sort_by(|a, b| {
            b.featured
                .cmp(&a.featured)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(projects)
    }

    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>> {
        let store = self.store.lock().unwrap();
        Ok(store.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn get_project_by_slug(&self, slug: &str) -> RepoResult<Option<Project>> {
        let store = self.store.lock().unwrap();
        Ok(store.projects.iter().find(|p| p.slug == slug).cloned())
    }

    async fn create_project(&self, slug: String, req: CreateProjectRequest) -> RepoResult<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            slug,
            title: req.title.trim().to_string(),
            client: req.client,
            summary: req.summary,
            body: req.body,
            cover_image: req.cover_image,
            tags: req.tags,
            featured: req.featured,
            published: req.published,
            created_at: now,
            updated_at: now,
        };
        self.store.lock().unwrap().projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        id: Uuid,
        req: UpdateProjectRequest,
    ) -> RepoResult<Option<Project>> {
        let mut store = self.store.lock().unwrap();
        let Some(project) = store.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            project.title = title;
        }
        if let Some(slug) = req.slug {
            project.slug = slug;
        }
        project.client = clear_or_keep(project.client.take(), req.client);
        if let Some(summary) = req.summary {
            project.summary = summary;
        }
        if let Some(body) = req.body {
            project.body = body;
        }
        project.cover_image = clear_or_keep(project.cover_image.take(), req.cover_image);
        if let Some(tags) = req.tags {
            project.tags = tags;
        }
        if let Some(featured) = req.featured {
            project.featured = featured;
        }
        if let Some(published) = req.published {
            project.published = published;
        }
        project.updated_at = Utc::now();
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.projects.len();
        store.projects.retain(|p| p.id != id);
        Ok(store.projects.len() < before)
    }

    // --- Services ---

    async fn list_services(&self, published_only: bool) -> RepoResult<Vec<Service>> {
        let store = self.store.lock().unwrap();
        let mut services: Vec<Service> = store
            .services
            .iter()
            .filter(|s| !published_only || s.published)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.title.cmp(&b.title)));
        Ok(services)
    }

    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>> {
        let store = self.store.lock().unwrap();
        Ok(store.services.iter().find(|s| s.id == id).cloned())
    }

    async fn get_service_by_slug(&self, slug: &str) -> RepoResult<Option<Service>> {
        let store = self.store.lock().unwrap();
        Ok(store.services.iter().find(|s| s.slug == slug).cloned())
    }

    async fn create_service(&self, slug: String, req: CreateServiceRequest) -> RepoResult<Service> {
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            slug,
            title: req.title.trim().to_string(),
            summary: req.summary,
            body: req.body,
            icon: req.icon,
            sort_order: req.sort_order,
            published: req.published,
            created_at: now,
            updated_at: now,
        };
        self.store.lock().unwrap().services.push(service.clone());
        Ok(service)
    }

    async fn update_service(
        &self,
        id: Uuid,
        req: UpdateServiceRequest,
    ) -> RepoResult<Option<Service>> {
        let mut store = self.store.lock().unwrap();
        let Some(service) = store.services.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            service.title = title;
        }
        if let Some(slug) = req.slug {
            service.slug = slug;
        }
        if let Some(summary) = req.summary {
            service.summary = summary;
        }
        if let Some(body) = req.body {
            service.body = body;
        }
        service.icon = clear_or_keep(service.icon.take(), req.icon);
        if let Some(order) = req.sort_order {
            service.sort_order = order;
        }
        if let Some(published) = req.published {
            service.published = published;
        }
        service.updated_at = Utc::now();
        Ok(Some(service.clone()))
    }

    async fn delete_service(&self, id: Uuid) -> RepoResult<bool> {
        let mut store = self.store.lock().unwrap();
        let before = store.services.len();
        store.services.retain(|s| s.id != id);
        Ok(store.services.len() < before)
    }

    // --- Settings & Dashboard ---

    async fn list_settings(&self) -> RepoResult<Vec<Setting>> {
        let store = self.store.lock().unwrap();
        Ok(store.settings.values().cloned().collect())
    }

    async fn upsert_settings(&self, values: SettingsMap) -> RepoResult<Vec<Setting>> {
        let mut store = self.store.lock().unwrap();
        let now = Utc::now();
        for (key, value) in values {
            store.settings.insert(
                key.clone(),
                Setting {
                    key,
                    value,
                    updated_at: now,
                },
            );
        }
        Ok(store.settings.values().cloned().collect())
    }

    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        let store = self.store.lock().unwrap();
        let posts_with = |status: PostStatus| {
            store
                .posts
                .iter()
                .filter(|p| p.status == status.as_str())
                .count() as i64
        };
        Ok(DashboardStats {
            published_posts: posts_with(PostStatus::Published),
            draft_posts: posts_with(PostStatus::Draft),
            forms: store.forms.len() as i64,
            new_entries: store
                .entries
                .iter()
                .filter(|e| e.status == EntryStatus::New.as_str())
                .count() as i64,
            total_entries: store.entries.len() as i64,
            media: store.media.len() as i64,
            users: store.users.len() as i64,
            projects: store.projects.len() as i64,
            services: store.services.len() as i64,
        })
    }
}

// --- APP HARNESS ---

/// TestApp
///
/// A fully wired router over the in-memory repository and mock storage. The
/// concrete handles stay reachable so tests can seed data and inspect effects.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(MockStorageService::new(), AppConfig::default())
}

pub fn spawn_app_with(storage: MockStorageService, config: AppConfig) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(storage.clone()) as StorageState,
        config,
    );
    TestApp {
        router: create_router(state.clone()),
        state,
        repo,
        storage,
    }
}

impl TestApp {
    /// Rebuilds the router around a different ranking provider.
    pub fn with_search(mut self, search: SearchState) -> Self {
        self.state.search = search;
        self.router = create_router(self.state.clone());
        self
    }

    /// Seeds an account whose password is `TEST_PASSWORD`.
    pub async fn seed_user(&self, email: &str, role: Role) -> User {
        self.repo
            .create_user(NewUser {
                email: email.to_string(),
                name: format!("{} account", role.as_str()),
                role,
                password_hash: hash_password(TEST_PASSWORD).unwrap(),
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        issue_token(user, &self.state.config).unwrap().0
    }

    /// Sends a request and returns the status, headers and parsed JSON body
    /// (`Value::Null` for empty or non-JSON bodies).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.call(request).await
    }

    pub async fn call(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let json = serde_json::from_str(&text).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub json: Value,
    pub text: String,
}

impl TestResponse {
    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
