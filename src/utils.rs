use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);

const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".jpg", ".jpeg", ".png", ".svg", ".img", ".gif", ".exe", ".mp4", ".flv", ".pdf", ".doc",
    ".ogv", ".webm", ".wmv", ".webp", ".mov", ".mp3", ".m4a", ".m4p", ".ppt", ".pptx", ".scss",
    ".tif", ".tiff", ".ttf", ".otf", ".woff", ".woff2", ".bmp", ".ico", ".eot", ".htc", ".swf",
    ".rtf", ".image", ".rf",
];

pub fn set_color_enabled(enabled: bool) {
    COLOR_ENABLED.store(enabled, Ordering::Relaxed);
    owo_colors::set_override(enabled);
}

pub fn colors_enabled() -> bool {
    COLOR_ENABLED.load(Ordering::Relaxed)
}

/// True for absolute `http://` / `https://` URLs that carry a host.
pub fn is_url(raw: &str) -> bool {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return false;
    }
    match Url::parse(trimmed) {
        Ok(url) => url.host_str().map(|h| !h.is_empty()).unwrap_or(false),
        Err(_) => false,
    }
}

/// True when the URL path points at a static asset that never carries parameters.
pub fn has_static_extension(raw: &str) -> bool {
    let path = match Url::parse(raw.trim()) {
        Ok(url) => url.path().to_ascii_lowercase(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_ascii_lowercase(),
    };
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Parses an absolute or relative link. Relative links are joined onto `base`.
pub fn resolve_link(base: &Url, link: &str) -> Option<Url> {
    let link = link.trim().replace("&amp;", "&");
    if link.is_empty() {
        return None;
    }
    let lower = link.to_ascii_lowercase();
    if ["javascript:", "mailto:", "data:", "tel:"].iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }
    match Url::parse(&link) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(&link).ok(),
        Err(_) => None,
    }
}

pub fn trim_token(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_string();
    }
    let mut out = value.chars().take(max_len.saturating_sub(1)).collect::<String>();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection_requires_scheme_and_host() {
        assert!(is_url("https://example.com/a?b=1"));
        assert!(is_url("  HTTP://example.com "));
        assert!(!is_url("example.com/a"));
        assert!(!is_url("ftp://example.com"));
        assert!(!is_url("https://"));
    }

    #[test]
    fn static_assets_are_flagged() {
        assert!(has_static_extension("https://cdn.example.com/app.CSS?v=2"));
        assert!(has_static_extension("https://example.com/font.woff2"));
        assert!(!has_static_extension("https://example.com/search.php?q=1"));
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("http://localhost/").unwrap();
        let url = resolve_link(&base, "/search?q=1&amp;page=2").unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["q", "page"]);
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
    }

    #[test]
    fn long_tokens_are_trimmed() {
        assert_eq!(trim_token("abcdef", 4), "abc…");
        assert_eq!(trim_token("abc", 4), "abc");
    }
}
