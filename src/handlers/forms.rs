use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::{IdOrSlug, non_empty};
use crate::{
    AppState,
    content::{check_slug, resolve_slug},
    error::{AppError, AppResult},
    forms::{RenderedForm, is_spam, render, validate_definition, validate_submission},
    models::{
        CreateFormRequest, EntryStatus, Form, FormEntry, NewFormEntry, SubmitFormRequest,
        SubmitFormResponse, UpdateEntryRequest, UpdateFormRequest,
    },
};

const MAX_SOURCE_PAGE_LEN: usize = 500;
const MAX_USER_AGENT_LEN: usize = 300;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct EntryFilter {
    /// `new | read | archived`
    pub status: Option<String>,
}

fn clip(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

async fn find_form(state: &AppState, key: IdOrSlug) -> AppResult<Option<Form>> {
    Ok(match key {
        IdOrSlug::Id(id) => state.repo.get_form(id).await?,
        IdOrSlug::Slug(slug) => state.repo.get_form_by_slug(&slug).await?,
    })
}

/// get_public_form
///
/// [Public Route] The render descriptor of an active form, by UUID or slug.
#[utoipa::path(
    get,
    path = "/api/forms/{id}",
    params(("id" = String, Path, description = "Form UUID or slug")),
    responses(
        (status = 200, description = "Render descriptor", body = RenderedForm),
        (status = 404, description = "Unknown or inactive form")
    ),
    tag = "forms"
)]
pub async fn get_public_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<RenderedForm>> {
    let form = find_form(&state, IdOrSlug::parse(&id))
        .await?
        .filter(Form::is_active)
        .ok_or(AppError::NotFound("Form"))?;
    Ok(Json(render(&form)))
}

/// submit_form
///
/// [Public Route] Validates a submission against the form schema and stores the
/// normalized values. Honeypot hits get the normal success reply but are not
/// stored.
#[utoipa::path(
    post,
    path = "/api/forms/submit",
    request_body = SubmitFormRequest,
    responses(
        (status = 201, description = "Submission accepted", body = SubmitFormResponse),
        (status = 400, description = "Neither form_id nor slug given"),
        (status = 404, description = "Unknown or inactive form"),
        (status = 422, description = "Field errors")
    ),
    tag = "forms"
)]
pub async fn submit_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SubmitFormRequest>,
) -> AppResult<(StatusCode, Json<SubmitFormResponse>)> {
    let key = match (payload.form_id, non_empty(payload.slug)) {
        (Some(id), _) => IdOrSlug::Id(id),
        (None, Some(slug)) => IdOrSlug::Slug(slug),
        (None, None) => return Err(AppError::BadRequest("form_id or slug is required".into())),
    };

    let form = find_form(&state, key)
        .await?
        .filter(Form::is_active)
        .ok_or(AppError::NotFound("Form"))?;

    if is_spam(&payload.data) {
        tracing::info!(form_id = %form.id, "honeypot triggered, submission discarded");
        return Ok((
            StatusCode::CREATED,
            Json(SubmitFormResponse {
                id: None,
                message: form.success_message,
            }),
        ));
    }

    let data = validate_submission(&form.fields.0, &payload.data).map_err(|fields| {
        tracing::debug!(form_id = %form.id, errors = fields.len(), "submission rejected");
        AppError::invalid_fields("Submission has invalid fields", fields)
    })?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| clip(ua, MAX_USER_AGENT_LEN));

    let entry = state
        .repo
        .create_entry(NewFormEntry {
            form_id: form.id,
            data: Value::Object(data),
            source_page: non_empty(payload.source_page).map(|p| clip(&p, MAX_SOURCE_PAGE_LEN)),
            user_agent,
        })
        .await?;

    tracing::info!(form_id = %form.id, entry_id = %entry.id, "form submission stored");
    Ok((
        StatusCode::CREATED,
        Json(SubmitFormResponse {
            id: Some(entry.id),
            message: form.success_message,
        }),
    ))
}

/// list_forms
///
/// [Staff Route] All forms including inactive ones, newest first.
#[utoipa::path(
    get,
    path = "/api/forms",
    responses((status = 200, description = "Forms", body = [Form])),
    tag = "forms"
)]
pub async fn list_forms(State(state): State<AppState>) -> AppResult<Json<Vec<Form>>> {
    Ok(Json(state.repo.list_forms().await?))
}

/// create_form
///
/// [Staff Route] The field schema is checked as a whole; every problem is
/// reported in one 422.
#[utoipa::path(
    post,
    path = "/api/forms",
    request_body = CreateFormRequest,
    responses(
        (status = 201, description = "Created", body = Form),
        (status = 409, description = "Slug already in use"),
        (status = 422, description = "Invalid field schema")
    ),
    tag = "forms"
)]
pub async fn create_form(
    State(state): State<AppState>,
    Json(payload): Json<CreateFormRequest>,
) -> AppResult<(StatusCode, Json<Form>)> {
    payload.validate()?;
    validate_definition(&payload.fields)
        .map_err(|fields| AppError::invalid_fields("Form definition is invalid", fields))?;
    let slug = resolve_slug(payload.slug.as_deref(), &payload.name)?;

    let form = state.repo.create_form(slug, payload).await?;
    tracing::info!(form_id = %form.id, slug = %form.slug, "form created");
    Ok((StatusCode::CREATED, Json(form)))
}

/// update_form
///
/// [Staff Route] Partial update; a replaced field list is re-validated.
#[utoipa::path(
    patch,
    path = "/api/forms/{id}",
    params(("id" = Uuid, Path, description = "Form ID")),
    request_body = UpdateFormRequest,
    responses(
        (status = 200, description = "Updated", body = Form),
        (status = 404, description = "Not found"),
        (status = 422, description = "Invalid field schema")
    ),
    tag = "forms"
)]
pub async fn update_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateFormRequest>,
) -> AppResult<Json<Form>> {
    payload.validate()?;
    if let Some(fields) = &payload.fields {
        validate_definition(fields)
            .map_err(|fields| AppError::invalid_fields("Form definition is invalid", fields))?;
    }
    payload.slug = payload.slug.as_deref().map(check_slug).transpose()?;

    let form = state
        .repo
        .update_form(id, payload)
        .await?
        .ok_or(AppError::NotFound("Form"))?;
    Ok(Json(form))
}

/// delete_form
///
/// [Staff Route] Removes the form and, through the foreign key, its entries.
#[utoipa::path(
    delete,
    path = "/api/forms/{id}",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "forms"
)]
pub async fn delete_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.delete_form(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Form"))
    }
}

/// list_entries
///
/// [Staff Route] Submissions of one form, newest first, optionally by status.
#[utoipa::path(
    get,
    path = "/api/forms/{id}/entries",
    params(("id" = Uuid, Path, description = "Form ID"), EntryFilter),
    responses(
        (status = 200, description = "Entries", body = [FormEntry]),
        (status = 404, description = "Unknown form")
    ),
    tag = "forms"
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(filter): Query<EntryFilter>,
) -> AppResult<Json<Vec<FormEntry>>> {
    let status = match non_empty(filter.status) {
        Some(raw) => Some(
            EntryStatus::parse(&raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown entry status '{raw}'")))?,
        ),
        None => None,
    };

    if state.repo.get_form(id).await?.is_none() {
        return Err(AppError::NotFound("Form"));
    }
    Ok(Json(state.repo.list_entries(id, status).await?))
}

/// update_entry
///
/// [Staff Route] Moves an entry through new → read → archived.
#[utoipa::path(
    patch,
    path = "/api/entries/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    request_body = UpdateEntryRequest,
    responses((status = 200, description = "Updated", body = FormEntry), (status = 404, description = "Not found")),
    tag = "forms"
)]
pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEntryRequest>,
) -> AppResult<Json<FormEntry>> {
    let entry = state
        .repo
        .update_entry_status(id, payload.status)
        .await?
        .ok_or(AppError::NotFound("Entry"))?;
    Ok(Json(entry))
}

/// delete_entry
///
/// [Staff Route]
#[utoipa::path(
    delete,
    path = "/api/entries/{id}",
    params(("id" = Uuid, Path, description = "Entry ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "forms"
)]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.delete_entry(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Entry"))
    }
}
