use crate::models::{
    CreateFormRequest, CreateMediaRequest, CreateProjectRequest, CreateServiceRequest,
    DashboardStats, EntryStatus, Form, FormEntry, FormStatus, Media, NewFormEntry, NewPost, NewUser, Post,
    PostChanges, PostStatus, Project, Role, Service, Setting, SettingsMap, UpdateFormRequest,
    UpdateProjectRequest, UpdateServiceRequest, User, UserCredentials,
};
use crate::retry::{RetryPolicy, is_transient_db_error, with_backoff};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction, query_builder::QueryBuilder, types::Json};
use std::sync::Arc;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// PostQuery
///
/// Filters for post listings. `status: None` means every status (staff only);
/// the handler decides what an anonymous caller may see.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub status: Option<PostStatus>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// AdminGuard
///
/// Outcome of a user change that must leave at least one administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminGuard<T> {
    Applied(T),
    NotFound,
    /// The change would have removed the last administrator; nothing was written.
    LastAdmin,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this
/// trait, so tests swap in an in-memory implementation.
///
/// Methods returning `Option` or `bool` use `None`/`false` for "no such row";
/// database failures always surface as `Err`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_credentials(&self, id: Uuid) -> RepoResult<Option<UserCredentials>>;
    async fn get_credentials_by_email(&self, email: &str) -> RepoResult<Option<UserCredentials>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    /// A role change away from admin is refused for the last administrator.
    async fn update_user(
        &self,
        id: Uuid,
        name: Option<String>,
        role: Option<Role>,
    ) -> RepoResult<AdminGuard<User>>;
    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool>;
    /// Refused for the last administrator.
    async fn delete_user(&self, id: Uuid) -> RepoResult<AdminGuard<()>>;
    async fn count_admins(&self) -> RepoResult<i64>;

    // --- Posts ---
    /// Returns the requested page and the total number of matching rows.
    async fn list_posts(&self, query: &PostQuery) -> RepoResult<(Vec<Post>, i64)>;
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>>;
    async fn create_post(&self, post: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;

    // --- Forms & Entries ---
    async fn list_forms(&self) -> RepoResult<Vec<Form>>;
    async fn get_form(&self, id: Uuid) -> RepoResult<Option<Form>>;
    async fn get_form_by_slug(&self, slug: &str) -> RepoResult<Option<Form>>;
    async fn create_form(&self, slug: String, req: CreateFormRequest) -> RepoResult<Form>;
    async fn update_form(&self, id: Uuid, req: UpdateFormRequest) -> RepoResult<Option<Form>>;
    async fn delete_form(&self, id: Uuid) -> RepoResult<bool>;
    async fn create_entry(&self, entry: NewFormEntry) -> RepoResult<FormEntry>;
    async fn list_entries(
        &self,
        form_id: Uuid,
        status: Option<EntryStatus>,
    ) -> RepoResult<Vec<FormEntry>>;
    async fn update_entry_status(
        &self,
        id: Uuid,
        status: EntryStatus,
    ) -> RepoResult<Option<FormEntry>>;
    async fn delete_entry(&self, id: Uuid) -> RepoResult<bool>;

    // --- Media ---
    async fn list_media(&self) -> RepoResult<Vec<Media>>;
    async fn create_media(
        &self,
        req: CreateMediaRequest,
        url: String,
        uploaded_by: Uuid,
    ) -> RepoResult<Media>;
    async fn update_media(&self, id: Uuid, alt_text: Option<String>) -> RepoResult<Option<Media>>;
    /// Deletes the row and returns it, so the caller can remove the stored object.
    async fn delete_media(&self, id: Uuid) -> RepoResult<Option<Media>>;

    // --- Projects ---
    async fn list_projects(
        &self,
        published_only: bool,
        featured_only: bool,
    ) -> RepoResult<Vec<Project>>;
    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>>;
    async fn get_project_by_slug(&self, slug: &str) -> RepoResult<Option<Project>>;
    async fn create_project(&self, slug: String, req: CreateProjectRequest) -> RepoResult<Project>;
    async fn update_project(
        &self,
        id: Uuid,
        req: UpdateProjectRequest,
    ) -> RepoResult<Option<Project>>;
    async fn delete_project(&self, id: Uuid) -> RepoResult<bool>;

    // --- Services ---
    async fn list_services(&self, published_only: bool) -> RepoResult<Vec<Service>>;
    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>>;
    async fn get_service_by_slug(&self, slug: &str) -> RepoResult<Option<Service>>;
    async fn create_service(&self, slug: String, req: CreateServiceRequest) -> RepoResult<Service>;
    async fn update_service(
        &self,
        id: Uuid,
        req: UpdateServiceRequest,
    ) -> RepoResult<Option<Service>>;
    async fn delete_service(&self, id: Uuid) -> RepoResult<bool>;

    // --- Settings & Dashboard ---
    async fn list_settings(&self) -> RepoResult<Vec<Setting>>;
    async fn upsert_settings(&self, values: SettingsMap) -> RepoResult<Vec<Setting>>;
    async fn get_stats(&self) -> RepoResult<DashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, email, name, role, created_at";
const CREDENTIAL_COLUMNS: &str = "id, email, name, role, password_hash, created_at";
const POST_COLUMNS: &str = "id, slug, title, excerpt, content, cover_image, tags, status, \
     author_id, reading_minutes, published_at, created_at, updated_at";
const FORM_COLUMNS: &str = "id, name, slug, description, fields, status, submit_label, \
     success_message, created_at, updated_at";
const ENTRY_COLUMNS: &str = "id, form_id, data, status, source_page, user_agent, created_at";
const MEDIA_COLUMNS: &str =
    "id, key, url, filename, mime_type, size_bytes, alt_text, uploaded_by, created_at";
const PROJECT_COLUMNS: &str = "id, slug, title, client, summary, body, cover_image, tags, \
     featured, published, created_at, updated_at";
const SERVICE_COLUMNS: &str =
    "id, slug, title, summary, body, icon, sort_order, published, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are checked at
/// runtime; dynamic filters go through `QueryBuilder` so every value is bound.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Page size used when walking every published post.
const PUBLISHED_BATCH: i64 = 500;

/// Every published post, newest first, read in batches with backoff. Feeds
/// the sitemap and the search corpus, which must not silently drop posts.
pub async fn all_published_posts(
    repo: &dyn Repository,
    policy: &RetryPolicy,
) -> RepoResult<Vec<Post>> {
    let mut posts: Vec<Post> = Vec::new();
    loop {
        let query = PostQuery {
            status: Some(PostStatus::Published),
            limit: PUBLISHED_BATCH,
            offset: posts.len() as i64,
            ..PostQuery::default()
        };
        let (batch, total) =
            with_backoff(policy, || repo.list_posts(&query), is_transient_db_error).await?;
        let fetched = batch.len();
        posts.extend(batch);
        if fetched == 0 || posts.len() as i64 >= total {
            return Ok(posts);
        }
    }
}

/// Escapes LIKE metacharacters (backslash first, as it is the escape
/// character) and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Locks every administrator row and reports whether `id` is the only one.
/// Admin rows are locked in id order so concurrent callers queue instead of
/// deadlocking.
async fn is_last_admin(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> RepoResult<bool> {
    let admins: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM users WHERE role = 'admin' ORDER BY id FOR UPDATE",
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(admins.len() == 1 && admins[0] == id)
}

/// Appends the WHERE clause shared by the post page query and its count query.
fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" WHERE TRUE");
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(tag) = &query.tag {
        builder.push(" AND ");
        builder.push_bind(tag.clone());
        builder.push(" = ANY(tags)");
    }
    if let Some(search) = &query.search {
        // Case-insensitive match across title, excerpt and body.
        let pattern = like_pattern(search);
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR excerpt ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR content ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_credentials(&self, id: Uuid) -> RepoResult<Option<UserCredentials>> {
        sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// E-mails are stored lower-cased; the lookup lower-cases its input too.
    async fn get_credentials_by_email(&self, email: &str) -> RepoResult<Option<UserCredentials>> {
        sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, name, role, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.email.trim().to_lowercase())
        .bind(user.name.trim())
        .bind(user.role.as_str())
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn update_user(
        &self,
        id: Uuid,
        name: Option<String>,
        role: Option<Role>,
    ) -> RepoResult<AdminGuard<User>> {
        let mut tx = self.pool.begin().await?;
        if role.is_some_and(|r| r != Role::Admin) && is_last_admin(&mut tx, id).await? {
            return Ok(AdminGuard::LastAdmin);
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = COALESCE($2, name), role = COALESCE($3, role) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name.map(|n| n.trim().to_string()))
        .bind(role.map(Role::as_str))
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(user.map_or(AdminGuard::NotFound, AdminGuard::Applied))
    }

    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<AdminGuard<()>> {
        let mut tx = self.pool.begin().await?;
        if is_last_admin(&mut tx, id).await? {
            return Ok(AdminGuard::LastAdmin);
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(if result.rows_affected() > 0 {
            AdminGuard::Applied(())
        } else {
            AdminGuard::NotFound
        })
    }

    async fn count_admins(&self) -> RepoResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await
    }

    // --- POSTS ---

    /// list_posts
    ///
    /// Runs the page query and a count query over the same filters.
    /// Published posts sort by publication date, everything else by last edit.
    async fn list_posts(&self, query: &PostQuery) -> RepoResult<(Vec<Post>, i64)> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM posts");
        push_post_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts"));
        push_post_filters(&mut builder, query);
        builder.push(" ORDER BY COALESCE(published_at, updated_at) DESC, created_at DESC, id LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;
        Ok((posts, total))
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_post(&self, post: NewPost) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(&format!(
            "INSERT INTO posts (id, slug, title, excerpt, content, cover_image, tags, status, \
                 author_id, reading_minutes, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                 CASE WHEN $8 = 'published' THEN NOW() ELSE NULL END, NOW(), NOW()) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(post.slug)
        .bind(post.title)
        .bind(post.excerpt)
        .bind(post.content)
        .bind(post.cover_image)
        .bind(post.tags)
        .bind(post.status.as_str())
        .bind(post.author_id)
        .bind(post.reading_minutes)
        .fetch_one(&self.pool)
        .await
    }

    /// update_post
    ///
    /// COALESCE keeps untouched columns; an empty `cover_image` clears it.
    /// `published_at` is stamped the first time the post becomes published.
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "UPDATE posts SET \
                 slug = COALESCE($2, slug), \
                 title = COALESCE($3, title), \
                 excerpt = COALESCE($4, excerpt), \
                 content = COALESCE($5, content), \
                 cover_image = CASE WHEN $6::text IS NULL THEN cover_image ELSE NULLIF($6, '') END, \
                 tags = COALESCE($7, tags), \
                 published_at = CASE WHEN COALESCE($8, status) = 'published' AND published_at IS NULL \
                     THEN NOW() ELSE published_at END, \
                 status = COALESCE($8, status), \
                 reading_minutes = COALESCE($9, reading_minutes), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.slug)
        .bind(changes.title)
        .bind(changes.excerpt)
        .bind(changes.content)
        .bind(changes.cover_image)
        .bind(changes.tags)
        .bind(changes.status.map(PostStatus::as_str))
        .bind(changes.reading_minutes)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- FORMS ---

    async fn list_forms(&self) -> RepoResult<Vec<Form>> {
        sqlx::query_as::<_, Form>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn get_form(&self, id: Uuid) -> RepoResult<Option<Form>> {
        sqlx::query_as::<_, Form>(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_form_by_slug(&self, slug: &str) -> RepoResult<Option<Form>> {
        sqlx::query_as::<_, Form>(&format!("SELECT {FORM_COLUMNS} FROM forms WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_form(&self, slug: String, req: CreateFormRequest) -> RepoResult<Form> {
        sqlx::query_as::<_, Form>(&format!(
            "INSERT INTO forms (id, name, slug, description, fields, status, submit_label, \
                 success_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'Submit'), \
                 COALESCE($8, 'Thanks, we will be in touch.'), NOW(), NOW()) \
             RETURNING {FORM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.name.trim())
        .bind(slug)
        .bind(req.description)
        .bind(Json(req.fields))
        .bind(req.status.unwrap_or(FormStatus::Active).as_str())
        .bind(req.submit_label)
        .bind(req.success_message)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_form(&self, id: Uuid, req: UpdateFormRequest) -> RepoResult<Option<Form>> {
        sqlx::query_as::<_, Form>(&format!(
            "UPDATE forms SET \
                 name = COALESCE($2, name), \
                 slug = COALESCE($3, slug), \
                 description = CASE WHEN $4::text IS NULL THEN description ELSE NULLIF($4, '') END, \
                 fields = COALESCE($5, fields), \
                 status = COALESCE($6, status), \
                 submit_label = COALESCE($7, submit_label), \
                 success_message = COALESCE($8, success_message), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {FORM_COLUMNS}"
        ))
        .bind(id)
        .bind(req.name)
        .bind(req.slug)
        .bind(req.description)
        .bind(req.fields.map(Json))
        .bind(req.status.map(|s| s.as_str()))
        .bind(req.submit_label)
        .bind(req.success_message)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_form(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_entry(&self, entry: NewFormEntry) -> RepoResult<FormEntry> {
        sqlx::query_as::<_, FormEntry>(&format!(
            "INSERT INTO form_entries (id, form_id, data, status, source_page, user_agent, created_at) \
             VALUES ($1, $2, $3, 'new', $4, $5, NOW()) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entry.form_id)
        .bind(entry.data)
        .bind(entry.source_page)
        .bind(entry.user_agent)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_entries(
        &self,
        form_id: Uuid,
        status: Option<EntryStatus>,
    ) -> RepoResult<Vec<FormEntry>> {
        sqlx::query_as::<_, FormEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM form_entries \
             WHERE form_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(form_id)
        .bind(status.map(EntryStatus::as_str))
        .fetch_all(&self.pool)
        .await
    }

    async fn update_entry_status(
        &self,
        id: Uuid,
        status: EntryStatus,
    ) -> RepoResult<Option<FormEntry>> {
        sqlx::query_as::<_, FormEntry>(&format!(
            "UPDATE form_entries SET status = $2 WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_entry(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM form_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- MEDIA ---

    async fn list_media(&self) -> RepoResult<Vec<Media>> {
        sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn create_media(
        &self,
        req: CreateMediaRequest,
        url: String,
        uploaded_by: Uuid,
    ) -> RepoResult<Media> {
        sqlx::query_as::<_, Media>(&format!(
            "INSERT INTO media (id, key, url, filename, mime_type, size_bytes, alt_text, \
                 uploaded_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(req.key)
        .bind(url)
        .bind(req.filename)
        .bind(req.mime_type)
        .bind(req.size_bytes)
        .bind(req.alt_text)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_media(&self, id: Uuid, alt_text: Option<String>) -> RepoResult<Option<Media>> {
        sqlx::query_as::<_, Media>(&format!(
            "UPDATE media SET alt_text = NULLIF($2, '') WHERE id = $1 RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(id)
        .bind(alt_text)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_media(&self, id: Uuid) -> RepoResult<Option<Media>> {
        sqlx::query_as::<_, Media>(&format!(
            "DELETE FROM media WHERE id = $1 RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    // --- PROJECTS ---

    async fn list_projects(
        &self,
        published_only: bool,
        featured_only: bool,
    ) -> RepoResult<Vec<Project>> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE ($1 = false OR published) AND ($2 = false OR featured) \
             ORDER BY featured DESC, created_at DESC"
        ))
        .bind(published_only)
        .bind(featured_only)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_project_by_slug(&self, slug: &str) -> RepoResult<Option<Project>> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_project(&self, slug: String, req: CreateProjectRequest) -> RepoResult<Project> {
        sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects (id, slug, title, client, summary, body, cover_image, tags, \
                 featured, published, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW()) \
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(req.title.trim())
        .bind(req.client)
        .bind(req.summary)
        .bind(req.body)
        .bind(req.cover_image)
        .bind(req.tags)
        .bind(req.featured)
        .bind(req.published)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_project(
        &self,
        id: Uuid,
        req: UpdateProjectRequest,
    ) -> RepoResult<Option<Project>> {
        sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects SET \
                 title = COALESCE($2, title), \
                 slug = COALESCE($3, slug), \
                 client = CASE WHEN $4::text IS NULL THEN client ELSE NULLIF($4, '') END, \
                 summary = COALESCE($5, summary), \
                 body = COALESCE($6, body), \
                 cover_image = CASE WHEN $7::text IS NULL THEN cover_image ELSE NULLIF($7, '') END, \
                 tags = COALESCE($8, tags), \
                 featured = COALESCE($9, featured), \
                 published = COALESCE($10, published), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.slug)
        .bind(req.client)
        .bind(req.summary)
        .bind(req.body)
        .bind(req.cover_image)
        .bind(req.tags)
        .bind(req.featured)
        .bind(req.published)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_project(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- SERVICES ---

    async fn list_services(&self, published_only: bool) -> RepoResult<Vec<Service>> {
        sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE ($1 = false OR published) \
             ORDER BY sort_order ASC, title ASC"
        ))
        .bind(published_only)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>> {
        sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_service_by_slug(&self, slug: &str) -> RepoResult<Option<Service>> {
        sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_service(&self, slug: String, req: CreateServiceRequest) -> RepoResult<Service> {
        sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (id, slug, title, summary, body, icon, sort_order, published, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(req.title.trim())
        .bind(req.summary)
        .bind(req.body)
        .bind(req.icon)
        .bind(req.sort_order)
        .bind(req.published)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_service(
        &self,
        id: Uuid,
        req: UpdateServiceRequest,
    ) -> RepoResult<Option<Service>> {
        sqlx::query_as::<_, Service>(&format!(
            "UPDATE services SET \
                 title = COALESCE($2, title), \
                 slug = COALESCE($3, slug), \
                 summary = COALESCE($4, summary), \
                 body = COALESCE($5, body), \
                 icon = CASE WHEN $6::text IS NULL THEN icon ELSE NULLIF($6, '') END, \
                 sort_order = COALESCE($7, sort_order), \
                 published = COALESCE($8, published), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {SERVICE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.title)
        .bind(req.slug)
        .bind(req.summary)
        .bind(req.body)
        .bind(req.icon)
        .bind(req.sort_order)
        .bind(req.published)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_service(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- SETTINGS & DASHBOARD ---

    async fn list_settings(&self) -> RepoResult<Vec<Setting>> {
        sqlx::query_as::<_, Setting>("SELECT key, value, updated_at FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
    }

    /// upsert_settings
    ///
    /// Writes all keys in one transaction so a partial save never becomes visible.
    async fn upsert_settings(&self, values: SettingsMap) -> RepoResult<Vec<Setting>> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            sqlx::query(
                "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, NOW()) \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.list_settings().await
    }

    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE status = 'published') AS published_posts,
                (SELECT COUNT(*) FROM posts WHERE status = 'draft') AS draft_posts,
                (SELECT COUNT(*) FROM forms) AS forms,
                (SELECT COUNT(*) FROM form_entries WHERE status = 'new') AS new_entries,
                (SELECT COUNT(*) FROM form_entries) AS total_entries,
                (SELECT COUNT(*) FROM media) AS media,
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM projects) AS projects,
                (SELECT COUNT(*) FROM services) AS services
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }
}
