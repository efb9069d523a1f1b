use std::io::Read;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/114.0",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: String,
    /// Lower-cased `Content-Type` header, empty when absent.
    pub content_type: String,
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Fetched>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self { method: "GET".to_string(), headers: Vec::new(), body: None }
    }
}

impl RequestTemplate {
    /// Custom headers replace defaults of the same name.
    pub fn effective_headers(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = DEFAULT_HEADERS
            .iter()
            .filter(|(name, _)| {
                !self.headers.iter().any(|(custom, _)| custom.eq_ignore_ascii_case(name))
            })
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        out.extend(self.headers.iter().cloned());
        out
    }
}

pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Blocking HTTP fetcher. `timeout` bounds connecting, every read and the
/// whole exchange including the body, so a host trickling bytes still frees
/// its worker on time.
pub struct HttpFetcher {
    agent: ureq::Agent,
    template: RequestTemplate,
    delay: Duration,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        proxy: Option<&str>,
        template: RequestTemplate,
        delay: Duration,
    ) -> Result<Self> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout(timeout)
            .redirects(5);
        if let Some(proxy) = proxy {
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        Ok(Self { agent: builder.build(), template, delay })
    }

    fn send(&self, url: &str) -> std::result::Result<ureq::Response, ureq::Error> {
        let mut request = self.agent.request(&self.template.method, url);
        for (name, value) in self.template.effective_headers() {
            request = request.set(&name, &value);
        }
        match &self.template.body {
            Some(body) => request.send_string(body),
            None => request.call(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Fetched> {
        let result = self.send(url);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let response = match result {
            Ok(response) => response,
            // Error pages still carry markup worth mining.
            Err(ureq::Error::Status(code, response)) => {
                debug!("{url} answered {code}");
                response
            }
            Err(e) => {
                return Err(Error::Fetch { url: url.to_string(), reason: e.to_string() });
            }
        };

        let content_type =
            response.header("Content-Type").unwrap_or("").to_ascii_lowercase();
        let mut buf = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut buf)
            .map_err(|e| Error::Fetch { url: url.to_string(), reason: e.to_string() })?;

        Ok(Fetched { body: String::from_utf8_lossy(&buf).into_owned(), content_type })
    }
}
