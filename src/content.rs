//! Text helpers shared by posts, projects, services and forms: slugs, tags and
//! reading time.

use crate::error::AppError;

pub const MAX_SLUG_LEN: usize = 80;
const WORDS_PER_MINUTE: usize = 200;

/// Lower-case ASCII slug: alphanumerics kept, every other run collapses to one `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_SLUG_LEN && slugify(slug) == slug
}

/// Use the supplied slug when present (it must already be in slug form),
/// otherwise derive one from the title.
pub fn resolve_slug(supplied: Option<&str>, title: &str) -> Result<String, AppError> {
    match supplied.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => check_slug(slug),
        None => {
            let slug = slugify(title);
            if slug.is_empty() {
                Err(AppError::BadRequest(
                    "Cannot derive a slug from the title; supply one explicitly".into(),
                ))
            } else {
                Ok(slug)
            }
        }
    }
}

pub fn check_slug(slug: &str) -> Result<String, AppError> {
    if is_valid_slug(slug) {
        Ok(slug.to_string())
    } else {
        Err(AppError::BadRequest(format!(
            "'{slug}' is not a valid slug (lowercase letters, digits and single dashes)"
        )))
    }
}

/// Trimmed, lower-cased, de-duplicated tags in their original order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

pub fn reading_minutes(content: &str) -> i32 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i32
}
