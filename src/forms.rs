//! Schema-driven forms.
//!
//! A [`FormField`] list is authored in the back office and stored as JSONB on the
//! form row. The same schema is used to check the definition itself, to render a
//! public descriptor for the site, and to validate and normalize submissions.
//! Everything here is pure logic with no database access.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{ValidateEmail, ValidateUrl};

use crate::models::Form;

/// Upper bound on fields per form.
pub const MAX_FIELDS: usize = 50;

/// Hidden honeypot input rendered by the site; humans leave it empty.
pub const HONEYPOT_FIELD: &str = "_gotcha";

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum FieldKind {
    #[default]
    Text,
    Email,
    Textarea,
    Number,
    Select,
    Radio,
    Checkbox,
    Date,
    Phone,
    Url,
    Hidden,
}

impl FieldKind {
    /// The HTML input type the site renders for this kind.
    pub fn input_type(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Textarea => "textarea",
            FieldKind::Number => "number",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Date => "date",
            FieldKind::Phone => "tel",
            FieldKind::Url => "url",
            FieldKind::Hidden => "hidden",
        }
    }

    pub fn has_options(self) -> bool {
        matches!(self, FieldKind::Select | FieldKind::Radio)
    }

    /// Kinds whose value is free text, bounded by character count.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            FieldKind::Text
                | FieldKind::Textarea
                | FieldKind::Hidden
                | FieldKind::Email
                | FieldKind::Phone
                | FieldKind::Url
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldOption {
    pub label: String,
    pub value: String,
}

/// FormField
///
/// One input of a form. `min`/`max` bound the character count for textual kinds
/// and the value for numbers. `pattern` is matched against the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// A single field-level problem, either in a submission or in a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

// --- Definition checks ---

/// Check a form definition, collecting every issue rather than stopping at the first.
pub fn validate_definition(fields: &[FormField]) -> Result<(), Vec<FieldError>> {
    let mut issues = Vec::new();

    if fields.is_empty() {
        issues.push(FieldError::new(
            "fields",
            "empty_schema",
            "A form needs at least one field",
        ));
    }
    if fields.len() > MAX_FIELDS {
        issues.push(FieldError::new(
            "fields",
            "too_many_fields",
            format!("A form may have at most {MAX_FIELDS} fields"),
        ));
    }

    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        let at = if field.name.is_empty() {
            format!("fields[{index}]")
        } else {
            field.name.clone()
        };

        if field.name == HONEYPOT_FIELD {
            issues.push(FieldError::new(&at, "reserved_name", "This name is reserved"));
        } else if !is_valid_name(&field.name) {
            issues.push(FieldError::new(
                &at,
                "invalid_name",
                "Names must start with a lowercase letter and contain only a-z, 0-9 and _",
            ));
        }
        if !field.name.is_empty() && !seen.insert(field.name.as_str()) {
            issues.push(FieldError::new(&at, "duplicate_name", "Field names must be unique"));
        }
        if field.label.trim().is_empty() {
            issues.push(FieldError::new(&at, "missing_label", "A label is required"));
        }

        if field.kind.has_options() {
            if field.options.is_empty() {
                issues.push(FieldError::new(
                    &at,
                    "missing_options",
                    "Choice fields need at least one option",
                ));
            }
            let mut values = HashSet::new();
            for option in &field.options {
                if !values.insert(option.value.as_str()) {
                    issues.push(FieldError::new(
                        &at,
                        "duplicate_option",
                        format!("Option value '{}' appears more than once", option.value),
                    ));
                }
            }
        }

        if let (Some(min), Some(max)) = (field.min, field.max) {
            if min > max {
                issues.push(FieldError::new(&at, "invalid_range", "min must not exceed max"));
            }
        }
        if field.kind.is_textual() && field.min.is_some_and(|m| m < 0.0) {
            issues.push(FieldError::new(&at, "invalid_range", "Lengths cannot be negative"));
        }

        if let Some(pattern) = &field.pattern {
            if anchored(pattern).is_none() {
                issues.push(FieldError::new(&at, "invalid_pattern", "Pattern is not a valid regular expression"));
            }
        }
    }

    if issues.is_empty() { Ok(()) } else { Err(issues) }
}

/// `^[a-z][a-z0-9_]{0,63}$`, shared by field names and setting keys.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= MAX_NAME_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn anchored(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).ok()
}

// --- Submissions ---

/// True when the honeypot input was filled in.
pub fn is_spam(data: &Value) -> bool {
    match data.get(HONEYPOT_FIELD) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

/// Validate a submission against the schema.
///
/// Returns the normalized values (trimmed strings, numbers as JSON numbers,
/// checkboxes as booleans, unknown keys dropped) or every field error found.
pub fn validate_submission(
    fields: &[FormField],
    data: &Value,
) -> Result<Map<String, Value>, Vec<FieldError>> {
    let Some(object) = data.as_object() else {
        return Err(vec![FieldError::new(
            "data",
            "invalid_type",
            "Submission data must be an object",
        )]);
    };

    let mut normalized = Map::new();
    let mut errors = Vec::new();

    for field in fields {
        let raw = object.get(&field.name).filter(|v| !is_blank(v));

        let Some(raw) = raw else {
            if field.kind == FieldKind::Checkbox {
                if field.required {
                    errors.push(required(field));
                } else {
                    normalized.insert(field.name.clone(), Value::Bool(false));
                }
            } else if field.required {
                errors.push(required(field));
            } else if let Some(default) = &field.default_value {
                normalized.insert(field.name.clone(), default.clone());
            }
            continue;
        };

        match normalize_value(field, raw) {
            Ok(value) => {
                normalized.insert(field.name.clone(), value);
            }
            Err(error) => errors.push(error),
        }
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn required(field: &FormField) -> FieldError {
    FieldError::new(&field.name, "required", format!("{} is required", field.label))
}

fn normalize_value(field: &FormField, raw: &Value) -> Result<Value, FieldError> {
    match field.kind {
        FieldKind::Number => normalize_number(field, raw),
        FieldKind::Checkbox => normalize_checkbox(field, raw),
        FieldKind::Select | FieldKind::Radio => {
            let text = scalar_text(raw).ok_or_else(|| invalid_type(field))?;
            if !field.options.iter().any(|o| o.value == text) {
                return Err(FieldError::new(
                    &field.name,
                    "invalid_option",
                    format!("{} must be one of the listed options", field.label),
                ));
            }
            check_pattern(field, &text)?;
            Ok(Value::String(text))
        }
        FieldKind::Date => {
            let text = scalar_text(raw).ok_or_else(|| invalid_type(field))?;
            NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|_| {
                FieldError::new(&field.name, "invalid_date", "Dates must use YYYY-MM-DD")
            })?;
            check_pattern(field, &text)?;
            Ok(Value::String(text))
        }
        _ => normalize_text(field, raw),
    }
}

fn invalid_type(field: &FormField) -> FieldError {
    FieldError::new(
        &field.name,
        "invalid_type",
        format!("{} has an unsupported value", field.label),
    )
}

/// Strings are trimmed; numbers and booleans are accepted in their text form.
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn normalize_text(field: &FormField, raw: &Value) -> Result<Value, FieldError> {
    let text = scalar_text(raw).ok_or_else(|| invalid_type(field))?;
    let length = text.chars().count() as f64;

    if let Some(min) = field.min {
        if length < min {
            return Err(FieldError::new(
                &field.name,
                "too_short",
                format!("{} must be at least {} characters", field.label, min),
            ));
        }
    }
    if let Some(max) = field.max {
        if length > max {
            return Err(FieldError::new(
                &field.name,
                "too_long",
                format!("{} must be at most {} characters", field.label, max),
            ));
        }
    }

    match field.kind {
        FieldKind::Email if !text.validate_email() => {
            return Err(FieldError::new(
                &field.name,
                "invalid_email",
                "Enter a valid email address",
            ));
        }
        FieldKind::Url if !text.validate_url() => {
            return Err(FieldError::new(&field.name, "invalid_url", "Enter a valid URL"));
        }
        FieldKind::Phone if !is_phone(&text) => {
            return Err(FieldError::new(
                &field.name,
                "invalid_phone",
                "Enter a valid phone number",
            ));
        }
        _ => {}
    }

    check_pattern(field, &text)?;
    Ok(Value::String(text))
}

/// Applies the field's `pattern`, if any, to a string value of any kind.
fn check_pattern(field: &FormField, text: &str) -> Result<(), FieldError> {
    match field.pattern.as_deref().and_then(anchored) {
        Some(pattern) if !pattern.is_match(text) => Err(FieldError::new(
            &field.name,
            "pattern_mismatch",
            format!("{} has an invalid format", field.label),
        )),
        _ => Ok(()),
    }
}

fn is_phone(text: &str) -> bool {
    let len = text.chars().count();
    let allowed = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'));
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=20).contains(&len) && allowed && digits >= 7
}

fn normalize_number(field: &FormField, raw: &Value) -> Result<Value, FieldError> {
    let invalid = || FieldError::new(&field.name, "invalid_number", format!("{} must be a number", field.label));

    let number = match raw {
        Value::Number(n) => n.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Number::from(i)
            } else {
                let f = s.parse::<f64>().map_err(|_| invalid())?;
                Number::from_f64(f).ok_or_else(invalid)?
            }
        }
        _ => return Err(invalid()),
    };
    let value = number.as_f64().ok_or_else(invalid)?;

    if let Some(min) = field.min {
        if value < min {
            return Err(FieldError::new(
                &field.name,
                "too_small",
                format!("{} must be at least {}", field.label, min),
            ));
        }
    }
    if let Some(max) = field.max {
        if value > max {
            return Err(FieldError::new(
                &field.name,
                "too_large",
                format!("{} must be at most {}", field.label, max),
            ));
        }
    }
    Ok(Value::Number(number))
}

fn normalize_checkbox(field: &FormField, raw: &Value) -> Result<Value, FieldError> {
    let checked = match raw {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" => true,
            "false" | "off" | "0" | "no" => false,
            _ => return Err(invalid_boolean(field)),
        },
        Value::Number(n) if n.as_i64() == Some(1) => true,
        Value::Number(n) if n.as_i64() == Some(0) => false,
        _ => return Err(invalid_boolean(field)),
    };
    if field.required && !checked {
        return Err(required(field));
    }
    Ok(Value::Bool(checked))
}

fn invalid_boolean(field: &FormField) -> FieldError {
    FieldError::new(&field.name, "invalid_boolean", format!("{} must be checked or unchecked", field.label))
}

// --- Rendering ---

/// RenderedForm
///
/// The public descriptor the site turns into markup. Contains no back-office
/// metadata (status, timestamps).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RenderedForm {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub submit_label: String,
    pub success_message: String,
    pub honeypot: String,
    pub fields: Vec<RenderedField>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RenderedField {
    pub name: String,
    pub label: String,
    pub input_type: String,
    pub required: bool,
    pub placeholder: Option<String>,
    pub help_text: Option<String>,
    pub options: Vec<FieldOption>,
    /// HTML constraint attributes (`minlength`, `maxlength`, `min`, `max`, `pattern`).
    pub attributes: BTreeMap<String, String>,
    #[ts(type = "unknown")]
    pub default_value: Option<Value>,
}

pub fn render(form: &Form) -> RenderedForm {
    RenderedForm {
        id: form.id,
        slug: form.slug.clone(),
        name: form.name.clone(),
        description: form.description.clone(),
        submit_label: form.submit_label.clone(),
        success_message: form.success_message.clone(),
        honeypot: HONEYPOT_FIELD.to_string(),
        fields: form.fields.0.iter().map(render_field).collect(),
    }
}

fn render_field(field: &FormField) -> RenderedField {
    let mut attributes = BTreeMap::new();
    let (min_key, max_key) = if field.kind == FieldKind::Number {
        ("min", "max")
    } else {
        ("minlength", "maxlength")
    };
    if field.kind == FieldKind::Number || field.kind.is_textual() {
        if let Some(min) = field.min {
            attributes.insert(min_key.to_string(), format_bound(min));
        }
        if let Some(max) = field.max {
            attributes.insert(max_key.to_string(), format_bound(max));
        }
    }
    if let Some(pattern) = &field.pattern {
        attributes.insert("pattern".to_string(), pattern.clone());
    }

    RenderedField {
        name: field.name.clone(),
        label: field.label.clone(),
        input_type: field.kind.input_type().to_string(),
        required: field.required,
        placeholder: field.placeholder.clone(),
        help_text: field.help_text.clone(),
        options: field.options.clone(),
        attributes,
        default_value: field.default_value.clone(),
    }
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
