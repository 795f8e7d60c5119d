//! Site search over published posts, services and projects.
//!
//! Ranking goes through [`SearchService`]: [`KeywordSearch`] always works
//! offline, [`AiSearchClient`] asks an OpenAI-compatible model to order the
//! documents and falls back to keyword ranking whenever the provider fails.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{Post, Project, Service},
    repository::{Repository, all_published_posts},
    retry::{RetryPolicy, is_transient_db_error, with_backoff},
};

pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_QUERY_LEN: usize = 200;
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 25;

const TITLE_WEIGHT: f64 = 3.0;
const SNIPPET_LEN: usize = 160;
/// Upper bound on documents offered to the model in one prompt.
const MAX_PROMPT_DOCUMENTS: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DocumentKind {
    Post,
    Service,
    Project,
}

impl DocumentKind {
    /// Public site path prefix for this kind of document.
    pub fn path_prefix(self) -> &'static str {
        match self {
            DocumentKind::Post => "/blog",
            DocumentKind::Service => "/services",
            DocumentKind::Project => "/work",
        }
    }
}

/// One searchable item of the public site.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub kind: DocumentKind,
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub snippet: String,
    pub body: String,
}

impl SearchDocument {
    fn into_hit(self, score: f64) -> SearchHit {
        SearchHit {
            url: format!("{}/{}", self.kind.path_prefix(), self.slug),
            kind: self.kind,
            id: self.id,
            slug: self.slug,
            title: self.title,
            snippet: self.snippet,
            score,
        }
    }
}

impl From<Post> for SearchDocument {
    fn from(post: Post) -> Self {
        let snippet = if post.excerpt.trim().is_empty() {
            truncate_chars(&post.content, SNIPPET_LEN)
        } else {
            post.excerpt
        };
        SearchDocument {
            kind: DocumentKind::Post,
            id: post.id,
            slug: post.slug,
            title: post.title,
            snippet,
            body: post.content,
        }
    }
}

impl From<Service> for SearchDocument {
    fn from(service: Service) -> Self {
        SearchDocument {
            kind: DocumentKind::Service,
            id: service.id,
            slug: service.slug,
            title: service.title,
            snippet: service.summary,
            body: service.body,
        }
    }
}

impl From<Project> for SearchDocument {
    fn from(project: Project) -> Self {
        let body = match &project.client {
            Some(client) => format!("{client}\n{}", project.body),
            None => project.body,
        };
        SearchDocument {
            kind: DocumentKind::Project,
            id: project.id,
            slug: project.slug,
            title: project.title,
            snippet: project.summary,
            body,
        }
    }
}

/// SearchHit
///
/// One ranked result returned by `GET /api/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SearchHit {
    pub kind: DocumentKind,
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub snippet: String,
    /// Site-relative link, e.g. `/blog/hello-world`.
    pub url: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
    /// True when the hits came from the result cache.
    pub cached: bool,
}

/// Lower-cased query with whitespace collapsed; the cache key is built from it.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn cache_key(query: &str, limit: usize) -> String {
    format!("{}|{limit}", normalize_query(query))
}

fn truncate_chars(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push('…');
    }
    out
}

/// load_corpus
///
/// Reads every published post, service and project. Each read goes through the
/// backoff helper since search is a pure read path.
pub async fn load_corpus(
    repo: &dyn Repository,
    policy: &RetryPolicy,
) -> Result<Vec<SearchDocument>, sqlx::Error> {
    let posts = all_published_posts(repo, policy).await?;
    let services = with_backoff(policy, || repo.list_services(true), is_transient_db_error).await?;
    let projects =
        with_backoff(policy, || repo.list_projects(true, false), is_transient_db_error).await?;

    let mut corpus = Vec::with_capacity(posts.len() + services.len() + projects.len());
    corpus.extend(posts.into_iter().map(SearchDocument::from));
    corpus.extend(services.into_iter().map(SearchDocument::from));
    corpus.extend(projects.into_iter().map(SearchDocument::from));
    Ok(corpus)
}

/// SearchService
///
/// Ranks a corpus for a query. Implementations never fail: a provider outage
/// degrades to keyword ranking instead of an error response.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, corpus: Vec<SearchDocument>, limit: usize)
    -> Vec<SearchHit>;
}

/// KeywordSearch
///
/// Term-frequency scoring: each query term counts once per occurrence in the
/// snippet and body and three times per occurrence in the title. Documents
/// without any match are dropped; ties sort by title.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSearch;

impl KeywordSearch {
    pub fn rank(&self, query: &str, corpus: Vec<SearchDocument>, limit: usize) -> Vec<SearchHit> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, SearchDocument)> = corpus
            .into_iter()
            .filter_map(|doc| {
                let score = keyword_score(&terms, &doc);
                (score > 0.0).then_some((score, doc))
            })
            .collect();

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(score, doc)| doc.into_hit(score))
            .collect()
    }
}

fn query_terms(query: &str) -> Vec<String> {
    normalize_query(query)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn keyword_score(terms: &[String], doc: &SearchDocument) -> f64 {
    let title = doc.title.to_lowercase();
    let text = format!("{} {}", doc.snippet, doc.body).to_lowercase();
    terms
        .iter()
        .map(|term| {
            title.matches(term.as_str()).count() as f64 * TITLE_WEIGHT
                + text.matches(term.as_str()).count() as f64
        })
        .sum()
}

/// The documents offered to the model. A corpus larger than one prompt is
/// narrowed to its best keyword matches instead of its first entries.
fn prompt_candidates<'a>(query: &str, corpus: &'a [SearchDocument]) -> Vec<&'a SearchDocument> {
    if corpus.len() <= MAX_PROMPT_DOCUMENTS {
        return corpus.iter().collect();
    }
    tracing::warn!(
        corpus = corpus.len(),
        offered = MAX_PROMPT_DOCUMENTS,
        "search corpus exceeds one prompt, offering the best keyword matches"
    );

    let terms = query_terms(query);
    let mut scored: Vec<(f64, &SearchDocument)> = corpus
        .iter()
        .map(|doc| (keyword_score(&terms, doc), doc))
        .collect();
    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    scored
        .into_iter()
        .take(MAX_PROMPT_DOCUMENTS)
        .map(|(_, doc)| doc)
        .collect()
}

#[async_trait]
impl SearchService for KeywordSearch {
    async fn search(
        &self,
        query: &str,
        corpus: Vec<SearchDocument>,
        limit: usize,
    ) -> Vec<SearchHit> {
        self.rank(query, corpus, limit)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Unexpected provider response: {0}")]
    Malformed(String),
}

/// AiSearchClient
///
/// Sends the query and a compact catalogue (id, kind, title, snippet) to an
/// OpenAI-compatible chat completions endpoint and expects back a JSON array of
/// document ids, best first.
pub struct AiSearchClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    fallback: KeywordSearch,
}

impl AiSearchClient {
    pub fn new(url: String, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            api_key,
            model,
            fallback: KeywordSearch,
        }
    }

    async fn ranked_ids(
        &self,
        query: &str,
        corpus: &[SearchDocument],
        limit: usize,
    ) -> Result<Vec<Uuid>, ProviderError> {
        let catalogue: Vec<_> = prompt_candidates(query, corpus)
            .into_iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "kind": doc.kind,
                    "title": doc.title,
                    "snippet": truncate_chars(&doc.snippet, SNIPPET_LEN),
                })
            })
            .collect();

        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "You rank website content for a search box. Reply with a JSON array of \
                         at most {limit} document ids from the catalogue, most relevant first. \
                         Reply with [] when nothing is relevant. No other text."
                    ),
                },
                {
                    "role": "user",
                    "content": json!({ "query": query, "catalogue": catalogue }).to_string(),
                },
            ],
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::HttpStatus(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?;

        parse_id_array(content)
    }
}

/// Extracts the first JSON array in `content` and parses its UUID strings.
/// Models sometimes wrap the array in prose or a code fence.
fn parse_id_array(content: &str) -> Result<Vec<Uuid>, ProviderError> {
    let start = content.find('[');
    let end = content.rfind(']');
    let slice = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(ProviderError::Malformed("no JSON array in reply".into())),
    };

    let raw: Vec<String> =
        serde_json::from_str(slice).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    Ok(raw
        .iter()
        .filter_map(|id| Uuid::parse_str(id.trim()).ok())
        .collect())
}

/// Orders `corpus` by `ids`, dropping unknown and repeated ids.
fn hits_from_ids(ids: &[Uuid], mut corpus: Vec<SearchDocument>, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::with_capacity(limit.min(ids.len()));
    for id in ids {
        if hits.len() >= limit {
            break;
        }
        if let Some(pos) = corpus.iter().position(|doc| doc.id == *id) {
            let doc = corpus.swap_remove(pos);
            // Rank-based score keeps the wire shape identical to keyword hits.
            let score = (limit - hits.len()) as f64;
            hits.push(doc.into_hit(score));
        }
    }
    hits
}

#[async_trait]
impl SearchService for AiSearchClient {
    async fn search(
        &self,
        query: &str,
        corpus: Vec<SearchDocument>,
        limit: usize,
    ) -> Vec<SearchHit> {
        if corpus.is_empty() {
            return Vec::new();
        }

        match self.ranked_ids(query, &corpus, limit).await {
            Ok(ids) => {
                let hits = hits_from_ids(&ids, corpus.clone(), limit);
                if hits.is_empty() && !ids.is_empty() {
                    tracing::warn!("AI search returned only unknown ids, using keyword ranking");
                    return self.fallback.rank(query, corpus, limit);
                }
                hits
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI search failed, using keyword ranking");
                self.fallback.rank(query, corpus, limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        routing::post,
    };
    use serde_json::Value;

    /// What the stub provider saw on its last request.
    #[derive(Clone, Default)]
    struct Recorded {
        authorization: Arc<Mutex<Option<String>>>,
        body: Arc<Mutex<Option<Value>>>,
    }

    /// Serves a chat-completions endpoint on an ephemeral port that answers
    /// every request with `status` and `content` as the assistant message.
    async fn stub_provider(status: StatusCode, content: String) -> (String, Recorded) {
        let recorded = Recorded::default();
        let seen = recorded.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen.clone();
                let content = content.clone();
                async move {
                    *seen.authorization.lock().unwrap() = headers
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.body.lock().unwrap() = Some(body);
                    (
                        status,
                        Json(json!({
                            "choices": [{ "message": { "role": "assistant", "content": content } }]
                        })),
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/chat/completions"), recorded)
    }

    fn doc(kind: DocumentKind, title: &str, body: &str) -> SearchDocument {
        SearchDocument {
            kind,
            id: Uuid::new_v4(),
            slug: crate::content::slugify(title),
            title: title.to_string(),
            snippet: String::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn title_matches_outrank_body_matches() {
        let corpus = vec![
            doc(DocumentKind::Post, "Notes", "rust rust"),
            doc(DocumentKind::Service, "Rust consulting", "we help teams"),
            doc(DocumentKind::Project, "Unrelated", "nothing here"),
        ];

        let hits = KeywordSearch.rank("Rust", corpus, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust consulting");
        assert_eq!(hits[0].url, "/services/rust-consulting");
        assert_eq!(hits[0].score, 3.0);
        assert_eq!(hits[1].score, 2.0);
    }

    #[test]
    fn ties_break_by_title_and_limit_applies() {
        let corpus = vec![
            doc(DocumentKind::Post, "Zeta", "seo"),
            doc(DocumentKind::Post, "Alpha", "seo"),
            doc(DocumentKind::Post, "Mid", "seo"),
        ];
        let hits = KeywordSearch.rank("seo", corpus, 2);
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Mid"]);
    }

    #[test]
    fn cache_key_normalizes_whitespace_and_case() {
        assert_eq!(cache_key("  Rust   WEB ", 10), "rust web|10");
        assert_ne!(cache_key("rust", 10), cache_key("rust", 5));
    }

    #[test]
    fn id_array_is_extracted_from_chatty_reply() {
        let id = Uuid::new_v4();
        let reply = format!("Sure! ```json\n[\"{id}\", \"not-a-uuid\"]\n```");
        assert_eq!(parse_id_array(&reply).unwrap(), vec![id]);
        assert!(parse_id_array("no idea").is_err());
    }

    #[test]
    fn unknown_and_duplicate_ids_are_skipped() {
        let a = doc(DocumentKind::Post, "A", "");
        let b = doc(DocumentKind::Post, "B", "");
        let ids = vec![b.id, Uuid::new_v4(), b.id, a.id];

        let hits = hits_from_ids(&ids, vec![a.clone(), b.clone()], 5);
        let order: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(order, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn unreachable_provider_falls_back_to_keywords() {
        let client = AiSearchClient::new(
            "http://127.0.0.1:9/v1/chat/completions".to_string(),
            None,
            "test-model".to_string(),
        );
        let corpus = vec![doc(DocumentKind::Post, "Rust tips", "")];

        let hits = client.search("rust", corpus, 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust tips");
    }

    #[tokio::test]
    async fn provider_order_decides_ranking() {
        let rust = doc(DocumentKind::Post, "Rust tips", "");
        let hiring = doc(DocumentKind::Post, "Hiring", "");
        let design = doc(DocumentKind::Service, "Design systems", "");
        let reply = format!(
            "```json\n[\"{}\", \"{}\", \"{}\"]\n```",
            design.id,
            Uuid::new_v4(),
            rust.id
        );
        let (url, recorded) = stub_provider(StatusCode::OK, reply).await;
        let client = AiSearchClient::new(url, Some("secret-key".into()), "test-model".into());

        let hits = client
            .search("rust", vec![rust.clone(), hiring, design.clone()], 5)
            .await;

        let order: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(order, vec![design.id, rust.id]);
        assert_eq!(hits[0].score, 5.0);
        assert_eq!(hits[1].score, 4.0);

        assert_eq!(
            recorded.authorization.lock().unwrap().as_deref(),
            Some("Bearer secret-key")
        );
        let body = recorded.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "test-model");
        let prompt: Value =
            serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
        assert_eq!(prompt["query"], "rust");
        assert_eq!(prompt["catalogue"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn error_status_falls_back_to_keywords() {
        let rust = doc(DocumentKind::Post, "Rust tips", "");
        let reply = format!("[\"{}\"]", Uuid::new_v4());
        let (url, recorded) = stub_provider(StatusCode::SERVICE_UNAVAILABLE, reply).await;
        let client = AiSearchClient::new(url, None, "test-model".into());

        let hits = client
            .search("rust", vec![doc(DocumentKind::Post, "Hiring", ""), rust.clone()], 5)
            .await;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, rust.id);
        assert!(recorded.authorization.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn reply_with_only_unknown_ids_falls_back_to_keywords() {
        let rust = doc(DocumentKind::Post, "Rust tips", "");
        let reply = format!("[\"{}\"]", Uuid::new_v4());
        let (url, _) = stub_provider(StatusCode::OK, reply).await;
        let client = AiSearchClient::new(url, None, "test-model".into());

        let hits = client.search("rust", vec![rust.clone()], 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, rust.id);
    }

    #[test]
    fn large_corpus_offers_best_matches_to_the_model() {
        let mut corpus: Vec<_> = (0..MAX_PROMPT_DOCUMENTS + 20)
            .map(|i| doc(DocumentKind::Post, &format!("Filler {i}"), "nothing"))
            .collect();
        let wanted = doc(DocumentKind::Post, "Rust tips", "");
        corpus.push(wanted.clone());

        let offered = prompt_candidates("rust", &corpus);
        assert_eq!(offered.len(), MAX_PROMPT_DOCUMENTS);
        assert_eq!(offered[0].id, wanted.id);

        assert_eq!(prompt_candidates("rust", &corpus[..3]).len(), 3);
    }
}
