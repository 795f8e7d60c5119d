//! Builders for the crawler-facing files: `sitemap.xml`, `robots.txt` and the
//! web app manifest.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Post, Project, Service};

/// Marketing pages that exist regardless of content.
pub const STATIC_PAGES: &[&str] = &[
    "/",
    "/services",
    "/blog",
    "/careers",
    "/pricing",
    "/contact",
    "/work",
];

pub const DEFAULT_THEME_COLOR: &str = "#111827";
const BACKGROUND_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub path: String,
    pub lastmod: Option<DateTime<Utc>>,
}

impl SitemapEntry {
    fn new(path: impl Into<String>, lastmod: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            lastmod,
        }
    }
}

pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Static pages followed by published posts, services and projects.
/// Unpublished items passed in are skipped.
pub fn sitemap_entries(
    posts: &[Post],
    services: &[Service],
    projects: &[Project],
) -> Vec<SitemapEntry> {
    let mut entries: Vec<SitemapEntry> = STATIC_PAGES
        .iter()
        .map(|path| SitemapEntry::new(*path, None))
        .collect();

    entries.extend(posts.iter().filter(|p| p.is_published()).map(|p| {
        SitemapEntry::new(
            format!("/blog/{}", p.slug),
            Some(p.published_at.unwrap_or(p.updated_at).max(p.updated_at)),
        )
    }));
    entries.extend(
        services
            .iter()
            .filter(|s| s.published)
            .map(|s| SitemapEntry::new(format!("/services/{}", s.slug), Some(s.updated_at))),
    );
    entries.extend(
        projects
            .iter()
            .filter(|p| p.published)
            .map(|p| SitemapEntry::new(format!("/work/{}", p.slug), Some(p.updated_at))),
    );
    entries
}

/// Renders a sitemaps.org `urlset`. `site_url` must not end with a slash.
pub fn render_sitemap(site_url: &str, entries: &[SitemapEntry]) -> String {
    let base = site_url.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        let loc = if entry.path == "/" {
            format!("{base}/")
        } else {
            format!("{base}{}", entry.path)
        };
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&loc)));
        if let Some(lastmod) = entry.lastmod {
            xml.push_str(&format!(
                "    <lastmod>{}</lastmod>\n",
                lastmod.format("%Y-%m-%d")
            ));
        }
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

pub fn robots_txt(site_url: &str) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /admin\nDisallow: /api\n\nSitemap: {}/sitemap.xml\n",
        site_url.trim_end_matches('/')
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestIcon {
    pub src: String,
    pub sizes: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// WebManifest
///
/// The `manifest.webmanifest` document.
#[derive(Debug, Clone, Serialize)]
pub struct WebManifest {
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub start_url: String,
    pub display: String,
    pub background_color: String,
    pub theme_color: String,
    pub icons: Vec<ManifestIcon>,
}

impl WebManifest {
    pub fn new(
        name: &str,
        short_name: Option<&str>,
        description: Option<&str>,
        theme_color: Option<&str>,
    ) -> Self {
        let icons = [192, 512]
            .into_iter()
            .map(|size| ManifestIcon {
                src: format!("/icons/icon-{size}.png"),
                sizes: format!("{size}x{size}"),
                mime_type: "image/png".to_string(),
            })
            .collect();

        Self {
            name: name.to_string(),
            short_name: short_name.unwrap_or(name).to_string(),
            description: description.map(str::to_string),
            start_url: "/".to_string(),
            display: "standalone".to_string(),
            background_color: BACKGROUND_COLOR.to_string(),
            theme_color: theme_color.unwrap_or(DEFAULT_THEME_COLOR).to_string(),
            icons,
        }
    }
}
