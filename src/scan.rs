use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use log::{debug, warn};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufRead, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::fetch::{parse_header, RequestTemplate};
use crate::pipeline::Input;
use crate::utils::{has_static_extension, is_url};

const MAX_MMAP_SIZE: u64 = 100 * 1024 * 1024; // 100 MB
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/*.lock",
    "**/Cargo.lock",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/poetry.lock",
    "**/Pipfile.lock",
    "**/Gemfile.lock",
    "**/composer.lock",
    "**/go.sum",
];

const HEADER_SCAN_LINES: usize = 40;

/// Loads every readable text file under `root` as a document input, sorted
/// by identifier.
pub fn walk_directory(root: &Path, excludes: &[String]) -> Vec<Input> {
    let exclude_matcher = build_exclude_matcher(excludes);
    let walker = WalkBuilder::new(root).hidden(false).git_ignore(true).build();

    let mut docs: Vec<(String, Input)> = walker
        .into_iter()
        .par_bridge()
        .filter_map(|result| {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Walker error: {}", err);
                    return None;
                }
            };
            let path = entry.path();
            if !path.is_file() || is_excluded_path(path, &exclude_matcher) {
                return None;
            }
            let content = read_text_file(path)?;
            let doc = document_from_file(path, content);
            Some((path.to_string_lossy().into_owned(), doc))
        })
        .collect();

    docs.sort_by(|a, b| a.0.cmp(&b.0));
    docs.into_iter().map(|(_, doc)| doc).collect()
}

fn read_text_file(path: &Path) -> Option<String> {
    let metadata = path.metadata().ok()?;
    if metadata.len() == 0 {
        return None;
    }
    if metadata.len() > MAX_MMAP_SIZE {
        warn!("Skipping large file {} ({} bytes)", path.display(), metadata.len());
        return None;
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Could not open {}: {}", path.display(), e);
            return None;
        }
    };
    let mut peek = [0u8; 1024];
    if let Ok(n) = file.read(&mut peek) {
        if memchr::memchr(0, &peek[..n]).is_some() {
            warn!("Skipping binary file {}", path.display());
            return None;
        }
    }

    // Safety: the map is read-only and dropped before this function returns.
    match unsafe { Mmap::map(&file) } {
        Ok(mmap) => Some(String::from_utf8_lossy(&mmap).into_owned()),
        Err(e) => {
            warn!("Could not map file {}: {}", path.display(), e);
            None
        }
    }
}

pub fn document_from_file(path: &Path, content: String) -> Input {
    let first_line = content.lines().next().unwrap_or("").trim();
    let identifier = if is_url(first_line) {
        first_line.to_string()
    } else {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    };
    let content_type = sniff_content_type(path, &content);
    Input::Document { identifier, content, content_type }
}

// An embedded `Content-Type:` header near the top wins over the extension.
pub fn sniff_content_type(path: &Path, content: &str) -> String {
    for line in content.lines().take(HEADER_SCAN_LINES) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-type") && !value.trim().is_empty() {
                return value.trim().to_ascii_lowercase();
            }
        }
    }

    let ext =
        path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "css" => "text/css",
        _ => "text/plain",
    }
    .to_string()
}

pub fn read_url_lines<R: BufRead>(reader: R) -> Vec<String> {
    let mut urls = Vec::new();
    for line in reader.lines().map_while(|l| l.ok()) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !is_url(line) {
            debug!("Ignoring non-URL target {line}");
            continue;
        }
        if has_static_extension(line) {
            debug!("Ignoring static asset {line}");
            continue;
        }
        urls.push(line.to_string());
    }
    urls
}

pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    Ok(read_url_lines(std::io::BufReader::new(file)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub url: String,
    pub template: RequestTemplate,
}

/// Parses a raw request (`GET /path HTTP/1.1`, headers, blank line, body).
/// The target is rebuilt as `https://<Host><path>`.
pub fn parse_raw_request(text: &str) -> Result<RawRequest> {
    let normalized = text.replace("\r\n", "\n");
    let (head, body) = match normalized.split_once("\n\n") {
        Some((head, body)) => (head, body),
        None => (normalized.as_str(), ""),
    };
    let mut lines = head.lines();

    let request_line = lines.next().map(str::trim).unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(Error::Request(format!("malformed request line `{request_line}`")));
    };

    let mut host = None;
    let mut headers = Vec::new();
    for line in lines {
        let Some((name, value)) = parse_header(line) else {
            continue;
        };
        if name.eq_ignore_ascii_case("host") {
            host = Some(value);
        } else if !name.eq_ignore_ascii_case("content-length") {
            headers.push((name, value));
        }
    }

    let url = if is_url(target) {
        target.to_string()
    } else {
        let host = host.ok_or_else(|| Error::Request("missing Host header".to_string()))?;
        format!("https://{}{}", host, target)
    };
    if !is_url(&url) {
        return Err(Error::Request(format!("cannot build a URL from `{url}`")));
    }

    let body = body.trim_end_matches('\n');
    Ok(RawRequest {
        url,
        template: RequestTemplate {
            method: method.to_ascii_uppercase(),
            headers,
            body: (!body.is_empty()).then(|| body.to_string()),
        },
    })
}

pub fn read_raw_request(path: &Path) -> Result<RawRequest> {
    parse_raw_request(&fs::read_to_string(path)?)
}

pub fn build_exclude_matcher(patterns: &[String]) -> Gitignore {
    let mut builder = GitignoreBuilder::new(".");
    for pat in DEFAULT_EXCLUDES {
        let _ = builder.add_line(None, pat);
    }
    for pat in patterns {
        let _ = builder.add_line(None, pat);
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

pub fn is_excluded_path(path: &Path, matcher: &Gitignore) -> bool {
    matcher.matched(path, path.is_dir()).is_ignore()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(sniff_content_type(Path::new("a/index.HTM"), "<p>"), "text/html");
        assert_eq!(sniff_content_type(Path::new("bundle.mjs"), "x"), "application/javascript");
        assert_eq!(sniff_content_type(Path::new("feed.xml"), "<a/>"), "application/xml");
        assert_eq!(sniff_content_type(Path::new("README"), "hi"), "text/plain");
    }

    #[test]
    fn embedded_header_wins() {
        let body = "https://example.com/api\nHTTP/1.1 200 OK\n\
                    Content-Type: Application/JSON; charset=utf-8\n\n{}";
        let hint = sniff_content_type(Path::new("resp.txt"), body);
        assert_eq!(hint, "application/json; charset=utf-8");
    }

    #[test]
    fn identifier_prefers_leading_url() {
        let saved = "https://example.com/x\nbody".to_string();
        let doc = document_from_file(Path::new("/tmp/saved/resp.txt"), saved);
        assert_eq!(doc.identifier(), "https://example.com/x");
        let doc = document_from_file(Path::new("/tmp/saved/app.js"), "var a = 1;".to_string());
        assert_eq!(doc.identifier(), "app.js");
    }

    #[test]
    fn url_lines_filter_noise() {
        let input = "https://a.test/?q=1\n\n# note\nnot a url\n\
                     https://a.test/logo.png\n  https://b.test/search  \n";
        let urls = read_url_lines(Cursor::new(input));
        assert_eq!(urls, vec!["https://a.test/?q=1", "https://b.test/search"]);
    }

    #[test]
    fn raw_request_is_parsed() {
        let raw = "POST /api/login?next=/home HTTP/1.1\r\n\
                   Host: example.com\r\n\
                   Content-Type: application/json\r\n\
                   Content-Length: 17\r\n\r\n\
                   {\"user\":\"alice\"}";
        let req = parse_raw_request(raw).unwrap();
        assert_eq!(req.url, "https://example.com/api/login?next=/home");
        assert_eq!(req.template.method, "POST");
        let expected = vec![("Content-Type".to_string(), "application/json".to_string())];
        assert_eq!(req.template.headers, expected);
        assert_eq!(req.template.body.as_deref(), Some("{\"user\":\"alice\"}"));
    }

    #[test]
    fn raw_request_without_host_fails() {
        assert!(matches!(parse_raw_request("GET /x HTTP/1.1\n\n"), Err(Error::Request(_))));
        assert!(matches!(parse_raw_request(""), Err(Error::Request(_))));
    }

    #[test]
    fn exclude_matcher_defaults() {
        let matcher = build_exclude_matcher(&["*.min.js".to_string()]);
        assert!(is_excluded_path(&PathBuf::from("./web/yarn.lock"), &matcher));
        assert!(is_excluded_path(&PathBuf::from("./web/app.min.js"), &matcher));
        assert!(!is_excluded_path(&PathBuf::from("./web/app.js"), &matcher));
    }

    #[test]
    fn walk_skips_binary_empty_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<input name=\"q\">").unwrap();
        fs::write(dir.path().join("app.js"), "var token;").unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        fs::write(dir.path().join("empty.txt"), "").unwrap();
        fs::write(dir.path().join("skip.lock"), "lock").unwrap();

        let docs = walk_directory(dir.path(), &[]);
        let ids: Vec<&str> = docs.iter().map(|d| d.identifier()).collect();
        assert_eq!(ids, vec!["app.js", "index.html"]);
        match &docs[1] {
            Input::Document { content_type, .. } => assert_eq!(content_type, "text/html"),
            other => panic!("unexpected input {other:?}"),
        }
    }
}
