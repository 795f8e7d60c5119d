mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{TEST_PASSWORD, TestApp, spawn_app, spawn_app_with};
use serde_json::{Value, json};
use site_backoffice::{
    AppConfig, Repository, handlers::users::bootstrap_admin, models::Role,
    repository::AdminGuard,
    storage::MockStorageService,
};
use uuid::Uuid;

fn contact_form() -> Value {
    json!({
        "name": "Contact Us",
        "fields": [
            { "name": "name", "label": "Name", "kind": "text", "required": true },
            { "name": "email", "label": "E-mail", "kind": "email", "required": true },
            {
                "name": "budget", "label": "Budget", "kind": "select",
                "options": [
                    { "value": "small", "label": "< 10k" },
                    { "value": "large", "label": "10k+" }
                ]
            },
            { "name": "newsletter", "label": "Newsletter", "kind": "checkbox" }
        ]
    })
}

async fn create_form(app: &TestApp, token: &str, body: Value) -> Value {
    let res = app.send(Method::POST, "/api/forms", Some(token), Some(body)).await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.text);
    res.json
}

// --- Forms ---

#[tokio::test]
async fn form_definition_is_validated_as_a_whole() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;

    let res = app
        .send(
            Method::POST,
            "/api/forms",
            Some(&app.token_for(&editor)),
            Some(json!({
                "name": "Broken",
                "fields": [
                    { "name": "Bad Name", "label": "A", "kind": "text" },
                    { "name": "choice", "label": "Choice", "kind": "select" }
                ]
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.json["code"], "INVALID_FIELDS");
    assert!(res.json["fields"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn public_form_renders_with_honeypot() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let form = create_form(&app, &app.token_for(&editor), contact_form()).await;
    assert_eq!(form["slug"], "contact-us");
    assert_eq!(form["status"], "active");

    let res = app.send(Method::GET, "/api/forms/contact-us", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json["honeypot"], "_gotcha");
    assert_eq!(res.json["fields"].as_array().unwrap().len(), 4);
    assert_eq!(res.json["submit_label"], "Submit");
}

#[tokio::test]
async fn submission_is_validated_normalized_and_stored() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let form = create_form(&app, &app.token_for(&editor), contact_form()).await;
    let form_id: Uuid = form["id"].as_str().unwrap().parse().unwrap();

    let invalid = app
        .send(
            Method::POST,
            "/api/forms/submit",
            None,
            Some(json!({
                "slug": "contact-us",
                "data": { "email": "not-an-email", "budget": "huge" }
            })),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
    let codes: Vec<(&str, &str)> = invalid.json["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| (f["field"].as_str().unwrap(), f["code"].as_str().unwrap()))
        .collect();
    assert!(codes.contains(&("name", "required")));
    assert!(codes.contains(&("email", "invalid_email")));
    assert!(codes.contains(&("budget", "invalid_option")));
    assert!(app.repo.entries_for(form_id).is_empty());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/forms/submit")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "integration-test")
        .body(Body::from(
            json!({
                "form_id": form_id,
                "data": { "name": "  Ada  ", "email": "ada@example.com", "extra": "dropped" },
                "source_page": "/contact"
            })
            .to_string(),
        ))
        .unwrap();
    let ok = app.call(request).await;
    assert_eq!(ok.status, StatusCode::CREATED, "{}", ok.text);
    assert!(ok.json["id"].is_string());
    assert_eq!(ok.json["message"], "Thanks, we will be in touch.");

    let entries = app.repo.entries_for(form_id);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.data["name"], "Ada");
    assert_eq!(entry.data["newsletter"], false);
    assert!(entry.data.get("extra").is_none());
    assert_eq!(entry.status, "new");
    assert_eq!(entry.user_agent.as_deref(), Some("integration-test"));
    assert_eq!(entry.source_page.as_deref(), Some("/contact"));
}

#[tokio::test]
async fn honeypot_submissions_look_successful_but_are_dropped() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let form = create_form(&app, &app.token_for(&editor), contact_form()).await;
    let form_id: Uuid = form["id"].as_str().unwrap().parse().unwrap();

    let res = app
        .send(
            Method::POST,
            "/api/forms/submit",
            None,
            Some(json!({
                "form_id": form_id,
                "data": { "name": "Bot", "email": "bot@spam.test", "_gotcha": "http://spam" }
            })),
        )
        .await;

    assert_eq!(res.status, StatusCode::CREATED);
    assert!(res.json["id"].is_null());
    assert!(app.repo.entries_for(form_id).is_empty());
}

#[tokio::test]
async fn inactive_or_unaddressed_forms_are_rejected() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let token = app.token_for(&editor);
    let form = create_form(&app, &token, contact_form()).await;
    let id = form["id"].as_str().unwrap();

    let deactivated = app
        .send(
            Method::PATCH,
            &format!("/api/forms/{id}"),
            Some(&token),
            Some(json!({ "status": "inactive" })),
        )
        .await;
    assert_eq!(deactivated.status, StatusCode::OK);

    let render = app.send(Method::GET, "/api/forms/contact-us", None, None).await;
    assert_eq!(render.status, StatusCode::NOT_FOUND);

    let submit = app
        .send(
            Method::POST,
            "/api/forms/submit",
            None,
            Some(json!({ "slug": "contact-us", "data": { "name": "Ada", "email": "a@b.co" } })),
        )
        .await;
    assert_eq!(submit.status, StatusCode::NOT_FOUND);

    let unaddressed = app
        .send(
            Method::POST,
            "/api/forms/submit",
            None,
            Some(json!({ "data": {} })),
        )
        .await;
    assert_eq!(unaddressed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entries_move_through_their_statuses() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let token = app.token_for(&editor);
    let form = create_form(&app, &token, contact_form()).await;
    let form_id = form["id"].as_str().unwrap().to_string();

    for name in ["One", "Two"] {
        let res = app
            .send(
                Method::POST,
                "/api/forms/submit",
                None,
                Some(json!({
                    "form_id": form_id,
                    "data": { "name": name, "email": "x@example.com" }
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    let entries_uri = format!("/api/forms/{form_id}/entries");
    let all = app.send(Method::GET, &entries_uri, Some(&token), None).await;
    assert_eq!(all.json.as_array().unwrap().len(), 2);
    let entry_id = all.json[0]["id"].as_str().unwrap().to_string();

    let read = app
        .send(
            Method::PATCH,
            &format!("/api/entries/{entry_id}"),
            Some(&token),
            Some(json!({ "status": "read" })),
        )
        .await;
    assert_eq!(read.json["status"], "read");

    let unread = app
        .send(
            Method::GET,
            &format!("{entries_uri}?status=new"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(unread.json.as_array().unwrap().len(), 1);

    let bad_filter = app
        .send(
            Method::GET,
            &format!("{entries_uri}?status=spam"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(bad_filter.status, StatusCode::BAD_REQUEST);

    let stats = app.send(Method::GET, "/api/stats", Some(&token), None).await;
    assert_eq!(stats.json["total_entries"], 2);
    assert_eq!(stats.json["new_entries"], 1);

    let deleted = app
        .send(
            Method::DELETE,
            &format!("/api/entries/{entry_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let unknown_form = app
        .send(
            Method::GET,
            &format!("/api/forms/{}/entries", Uuid::new_v4()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(unknown_form.status, StatusCode::NOT_FOUND);
}

// --- Media ---

#[tokio::test]
async fn upload_url_then_register_then_delete() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let token = app.token_for(&editor);

    let upload = app
        .send(
            Method::POST,
            "/api/media/upload-url",
            Some(&token),
            Some(json!({ "filename": "Hero Shot.PNG", "content_type": "image/png", "size_bytes": 2048 })),
        )
        .await;
    assert_eq!(upload.status, StatusCode::OK, "{}", upload.text);
    let key = upload.json["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("media/"));
    assert!(key.ends_with(".png"));
    assert!(upload.json["upload_url"].as_str().unwrap().contains("signature=fake"));
    assert_eq!(
        upload.json["public_url"],
        format!("http://localhost:9000/site-test/{key}")
    );

    let registered = app
        .send(
            Method::POST,
            "/api/media",
            Some(&token),
            Some(json!({
                "key": key,
                "filename": "Hero Shot.PNG",
                "mime_type": "image/png",
                "size_bytes": 2048,
                "alt_text": "Team photo"
            })),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.json["uploaded_by"], editor.id.to_string());
    let media_id = registered.json["id"].as_str().unwrap().to_string();

    let deleted = app
        .send(
            Method::DELETE,
            &format!("/api/media/{media_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.storage.deleted_keys(), vec![key]);
    assert_eq!(app.repo.media_count(), 0);
}

#[tokio::test]
async fn uploads_reject_bad_types_sizes_and_keys() {
    let app = spawn_app();
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let token = app.token_for(&editor);

    let exe = app
        .send(
            Method::POST,
            "/api/media/upload-url",
            Some(&token),
            Some(json!({ "filename": "run.exe", "content_type": "application/x-msdownload", "size_bytes": 10 })),
        )
        .await;
    assert_eq!(exe.status, StatusCode::BAD_REQUEST);

    let huge = app
        .send(
            Method::POST,
            "/api/media/upload-url",
            Some(&token),
            Some(json!({
                "filename": "big.png",
                "content_type": "image/png",
                "size_bytes": app.state.config.max_upload_bytes + 1
            })),
        )
        .await;
    assert_eq!(huge.status, StatusCode::BAD_REQUEST);

    let escaping_key = app
        .send(
            Method::POST,
            "/api/media",
            Some(&token),
            Some(json!({
                "key": "media/../secrets.png",
                "filename": "secrets.png",
                "mime_type": "image/png",
                "size_bytes": 10
            })),
        )
        .await;
    assert_eq!(escaping_key.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.media_count(), 0);
}

#[tokio::test]
async fn storage_failures_surface_as_bad_gateway_for_uploads_only() {
    let app = spawn_app_with(MockStorageService::new_failing(), AppConfig::default());
    let editor = app.seed_user("editor@example.com", Role::Editor).await;
    let token = app.token_for(&editor);

    let upload = app
        .send(
            Method::POST,
            "/api/media/upload-url",
            Some(&token),
            Some(json!({ "filename": "a.jpg", "content_type": "image/jpeg", "size_bytes": 10 })),
        )
        .await;
    assert_eq!(upload.status, StatusCode::BAD_GATEWAY);
    assert_eq!(upload.json["code"], "UPSTREAM_ERROR");

    let registered = app
        .send(
            Method::POST,
            "/api/media",
            Some(&token),
            Some(json!({
                "key": "media/a.jpg",
                "filename": "a.jpg",
                "mime_type": "image/jpeg",
                "size_bytes": 10
            })),
        )
        .await;
    let media_id = registered.json["id"].as_str().unwrap().to_string();

    // The row goes even when the object cannot be removed.
    let deleted = app
        .send(
            Method::DELETE,
            &format!("/api/media/{media_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.repo.media_count(), 0);
}

// --- Users ---

#[tokio::test]
async fn admins_manage_accounts() {
    let app = spawn_app();
    let admin = app.seed_user("admin@example.com", Role::Admin).await;
    let token = app.token_for(&admin);

    let created = app
        .send(
            Method::POST,
            "/api/users",
            Some(&token),
            Some(json!({
                "email": "writer@example.com",
                "name": "Writer",
                "password": TEST_PASSWORD,
                "role": "editor"
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json["role"], "editor");
    let writer_id = created.json["id"].as_str().unwrap().to_string();

    let promoted = app
        .send(
            Method::PATCH,
            &format!("/api/users/{writer_id}"),
            Some(&token),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(promoted.json["role"], "admin");

    // With two admins, one may now be removed.
    let deleted = app
        .send(
            Method::DELETE,
            &format!("/api/users/{writer_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admins_cannot_remove_themselves_or_the_last_admin() {
    let app = spawn_app();
    let admin = app.seed_user("admin@example.com", Role::Admin).await;
    let token = app.token_for(&admin);

    let self_demote = app
        .send(
            Method::PATCH,
            &format!("/api/users/{}", admin.id),
            Some(&token),
            Some(json!({ "role": "editor" })),
        )
        .await;
    assert_eq!(self_demote.status, StatusCode::CONFLICT);

    let self_delete = app
        .send(
            Method::DELETE,
            &format!("/api/users/{}", admin.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(self_delete.status, StatusCode::CONFLICT);

    let unknown = app
        .send(
            Method::DELETE,
            &format!("/api/users/{}", Uuid::new_v4()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(app.repo.count_admins().await.unwrap(), 1);
}

#[tokio::test]
async fn repository_refuses_to_remove_the_sole_admin() {
    let app = spawn_app();
    let admin = app.seed_user("admin@example.com", Role::Admin).await;
    let editor = app.seed_user("editor@example.com", Role::Editor).await;

    assert!(matches!(
        app.repo.update_user(admin.id, None, Some(Role::Editor)).await.unwrap(),
        AdminGuard::LastAdmin
    ));
    assert_eq!(app.repo.delete_user(admin.id).await.unwrap(), AdminGuard::LastAdmin);
    assert_eq!(app.repo.delete_user(editor.id).await.unwrap(), AdminGuard::Applied(()));
    assert_eq!(app.repo.count_admins().await.unwrap(), 1);
}

#[tokio::test]
async fn bootstrap_admin_is_idempotent() {
    let app = spawn_app();

    let created = bootstrap_admin(app.repo.as_ref(), "root@example.com", TEST_PASSWORD)
        .await
        .unwrap();
    let again = bootstrap_admin(app.repo.as_ref(), "root@example.com", TEST_PASSWORD)
        .await
        .unwrap();

    assert!(created);
    assert!(!again);
    assert_eq!(app.repo.count_admins().await.unwrap(), 1);

    let weak = bootstrap_admin(app.repo.as_ref(), "other@example.com", "short").await;
    assert!(weak.is_err());
}
