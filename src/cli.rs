use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::aggregate::{LengthBounds, SortOrder};
use crate::error::{Error, Result};
use crate::fetch::{parse_header, RequestTemplate};
use crate::output::{ExportFormat, ExportOptions};
use crate::pipeline::ScanConfig;
use crate::utils::is_url;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Discovers and classifies candidate HTTP parameter names.",
    long_about = None
)]
pub struct Cli {
    /// Target URL (repeatable)
    #[arg(short, long)]
    pub url: Vec<String>,

    /// File with one target URL per line
    #[arg(short, long)]
    pub list: Option<String>,

    /// Analyse files under a directory instead of fetching
    #[arg(short, long)]
    pub directory: Option<String>,

    /// Raw HTTP request file supplying target, method, headers and body
    #[arg(short, long)]
    pub request: Option<String>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Seconds to wait after each request
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// HTTP method [default: GET, or the method of --request]
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Request body
    #[arg(long)]
    pub data: Option<String>,

    /// Extra header, e.g. -H "Cookie: a=b" (repeatable)
    #[arg(short = 'H', long)]
    pub header: Vec<String>,

    /// Proxy URL, e.g. http://127.0.0.1:8080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Minimum parameter length kept in results
    #[arg(long, default_value_t = 1)]
    pub min_length: usize,

    /// Maximum parameter length kept in results
    #[arg(long, default_value_t = 30)]
    pub max_length: usize,

    /// Tokens longer than this are dropped while cleaning
    #[arg(long, default_value_t = 100)]
    pub max_token_length: usize,

    /// Result ordering
    #[arg(long, value_enum, default_value_t = SortOrder::Discovery)]
    pub sort: SortOrder,

    /// Export format for --output
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Txt)]
    pub format: ExportFormat,

    /// Write results to a file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Show where each parameter was first found
    #[arg(long)]
    pub include_origin: bool,

    /// Flag suspicious parameters and write a <name>_suspicious.txt sidecar
    #[arg(long)]
    pub report_sus: bool,

    /// Keep only suspicious parameters
    #[arg(long)]
    pub sus_only: bool,

    /// Only log errors
    #[arg(long)]
    pub silent: bool,

    /// Disable colorized output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Exclude glob patterns for --directory (repeatable), e.g. -x "vendor/**"
    #[arg(short = 'x', long)]
    pub exclude: Vec<String>,
}

impl Cli {
    /// Checks option combinations clap cannot express. `stdin_piped` tells
    /// whether targets may still arrive on stdin.
    pub fn validate(&self, stdin_piped: bool) -> Result<()> {
        let has_urls = !self.url.is_empty() || self.list.is_some() || self.request.is_some();
        if !has_urls && self.directory.is_none() && !stdin_piped {
            return Err(Error::Config(
                "no input: use --url, --list, --directory, --request or pipe URLs on stdin"
                    .to_string(),
            ));
        }
        if self.directory.is_some() && has_urls {
            return Err(Error::Config("--directory cannot be combined with URL inputs".to_string()));
        }
        if self.max_length == 0 {
            return Err(Error::Config("--max-length must be greater than 0".to_string()));
        }
        if self.min_length >= self.max_length {
            return Err(Error::Config(format!(
                "--min-length ({}) must be less than --max-length ({})",
                self.min_length, self.max_length
            )));
        }
        if let Some(bad) = self.url.iter().find(|u| !is_url(u)) {
            return Err(Error::Config(format!("not a valid URL: {bad}")));
        }
        if let Some(proxy) = &self.proxy {
            let valid = Url::parse(proxy).map(|u| u.host_str().is_some()).unwrap_or(false);
            if !valid {
                return Err(Error::Config(format!("invalid proxy {proxy}")));
            }
        }
        if let Some(bad) = self.header.iter().find(|h| parse_header(h).is_none()) {
            return Err(Error::Config(format!("header must look like `Key: Value`: {bad}")));
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            workers: self.threads.max(1),
            bounds: LengthBounds { min: self.min_length, max: self.max_length },
            max_token_len: self.max_token_length,
            timeout: Duration::from_secs(self.timeout),
            delay: Duration::from_secs(self.delay),
        }
    }

    pub fn request_template(&self) -> RequestTemplate {
        RequestTemplate {
            method: self.method.as_deref().unwrap_or("GET").to_ascii_uppercase(),
            headers: self.header.iter().filter_map(|h| parse_header(h)).collect(),
            body: self.data.clone(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            format: self.format,
            include_origin: self.include_origin,
            report_sus: self.report_sus,
            sus_only: self.sus_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("paramsift").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let cli = parse(&["-u", "https://a.test/"]);
        let config = cli.scan_config();
        assert_eq!(config.workers, 10);
        assert_eq!(config.bounds, LengthBounds { min: 1, max: 30 });
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(cli.sort, SortOrder::Discovery);
        assert_eq!(cli.format, ExportFormat::Txt);
        assert!(cli.validate(false).is_ok());
    }

    #[test]
    fn input_is_required_unless_piped() {
        let cli = parse(&[]);
        assert!(cli.validate(false).is_err());
        assert!(cli.validate(true).is_ok());
    }

    #[test]
    fn directory_excludes_urls() {
        let cli = parse(&["-d", "site", "-u", "https://a.test/"]);
        assert!(matches!(cli.validate(false), Err(Error::Config(_))));
    }

    #[test]
    fn length_bounds_checked() {
        let bounds = |min: &str, max: &str| {
            parse(&["-d", "x", "--min-length", min, "--max-length", max]).validate(false)
        };
        assert!(bounds("0", "0").is_err());
        assert!(bounds("5", "5").is_err());
        assert!(bounds("2", "5").is_ok());
    }

    #[test]
    fn proxy_and_headers_checked() {
        assert!(parse(&["-u", "https://a.test/", "--proxy", "127.0.0.1"]).validate(false).is_err());
        let proxied = parse(&["-u", "https://a.test/", "--proxy", "http://127.0.0.1:8080"]);
        assert!(proxied.validate(false).is_ok());
        assert!(parse(&["-u", "https://a.test/", "-H", "broken"]).validate(false).is_err());
    }

    #[test]
    fn sort_and_format_values() {
        let cli = parse(&["-d", "x", "--sort", "sus", "-f", "json", "-X", "post", "--data", "a=1"]);
        assert_eq!(cli.sort, SortOrder::Suspicious);
        assert_eq!(cli.format, ExportFormat::Json);
        let template = cli.request_template();
        assert_eq!(template.method, "POST");
        assert_eq!(template.body.as_deref(), Some("a=1"));
    }
}
