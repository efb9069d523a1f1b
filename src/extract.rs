use log::trace;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::heuristics::{find_block_end, split_list, top_level_keys};
use crate::utils::{is_url, resolve_link};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    UrlQuery,
    PathSegment,
    PathTemplate,
    HtmlAttribute,
    FormField,
    JsDeclaration,
    JsFunctionParam,
    JsonKey,
    XmlAttribute,
    Comment,
}

impl SourceTag {
    pub fn label(self) -> &'static str {
        match self {
            SourceTag::UrlQuery => "url-query",
            SourceTag::PathSegment => "path-segment",
            SourceTag::PathTemplate => "path-template",
            SourceTag::HtmlAttribute => "html-attribute",
            SourceTag::FormField => "form-field",
            SourceTag::JsDeclaration => "js-declaration",
            SourceTag::JsFunctionParam => "js-function-param",
            SourceTag::JsonKey => "json-key",
            SourceTag::XmlAttribute => "xml-attribute",
            SourceTag::Comment => "comment",
        }
    }
}

/// Informational strength of the source a candidate came from. Never used
/// for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn label(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub text: String,
    pub source: SourceTag,
    pub confidence: Confidence,
}

impl RawCandidate {
    pub fn new(text: impl Into<String>, source: SourceTag, confidence: Confidence) -> Self {
        Self { text: text.into(), source, confidence }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentHint {
    pub script_only: bool,
    pub xml: bool,
    pub json: bool,
}

impl ContentHint {
    pub fn parse(content_type: &str) -> Self {
        let lower = content_type.to_ascii_lowercase();
        Self {
            script_only: lower.contains("javascript") || lower.contains("ecmascript"),
            xml: lower.contains("xml"),
            json: lower.contains("json"),
        }
    }

    fn allows(self, scope: Scope) -> bool {
        match scope {
            Scope::Any => true,
            Scope::Markup => !self.script_only,
            Scope::Xml => self.xml,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Any,
    Markup,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    None,
    Comma,
    Whitespace,
}

enum Matcher {
    Pattern(Regex),
    /// Anchor ending in `{`, block bounded by brace counting.
    NestedObject(Regex),
    JsonDocument,
    LinkQuery(Regex),
    LinkPath(Regex),
    /// `body` isolates comment text, `token` picks names out of it.
    Comment { body: Regex, token: Regex },
}

struct Rule {
    name: &'static str,
    source: SourceTag,
    confidence: Confidence,
    scope: Scope,
    split: Split,
    matcher: Matcher,
}

fn compile(rule: &'static str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::Rule { rule, source })
}

impl Rule {
    fn new(
        name: &'static str,
        source: SourceTag,
        confidence: Confidence,
        matcher: Matcher,
    ) -> Self {
        Self { name, source, confidence, scope: Scope::Any, split: Split::None, matcher }
    }

    fn pattern(
        name: &'static str,
        source: SourceTag,
        confidence: Confidence,
        pattern: &str,
    ) -> Result<Self> {
        Ok(Self::new(name, source, confidence, Matcher::Pattern(compile(name, pattern)?)))
    }

    fn scoped(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }
}

const URL_QUERY: &str = r"(?:[?&]|&amp;)([A-Za-z_][A-Za-z0-9_.\-\[\]]*)=";

const PATH_TEMPLATE: &str = r"\$?\{([A-Za-z_][A-Za-z0-9_]*)\}";

const HTML_ID: &str = r#"(?i)\bid\s*=\s*["']([A-Za-z0-9_\-]+)["']"#;

const HTML_CLASS: &str = r#"(?i)\bclass\s*=\s*["']([^"']+)["']"#;

const FORM_FIELD: &str =
    r#"(?i)<(?:input|select|textarea|button)\b[^>]*?\bname\s*=\s*["']([^"']+)["']"#;

const SCRIPT_PARAM_ACCESS: &str = concat!(
    r"(?:(?:getParameter|searchParams\.get|searchParams\.has|getQueryParam|query\.get)",
    r#"\s*\(\s*["']([A-Za-z_][A-Za-z0-9_.\-]*)["'])"#,
    r"|(?:\b(?:params|query|body|args|request\.(?:GET|POST|args|form))",
    r#"\[\s*["']([A-Za-z_][A-Za-z0-9_.\-]*)["']\s*\])"#,
);

const FORM_DATA: &str = concat!(
    r#"(?:\.(?:append|set)\s*\(\s*["']([A-Za-z_][A-Za-z0-9_.\-\[\]]*)["']\s*,)"#,
    r#"|(?:\bregister\s*\(\s*["']([A-Za-z_][A-Za-z0-9_.]*)["'])"#,
);

// `parameters: [{ name: "x" ...` and any `{ name: "x", in: "query" }` entry.
const OPENAPI_PARAMETER: &str = concat!(
    r#"(?:\bparameters["']?\s*:\s*\[\s*\{\s*["']?name["']?\s*:\s*["']"#,
    r#"([A-Za-z_][A-Za-z0-9_.\-]*)["'])"#,
    r#"|(?:\{\s*["']?name["']?\s*:\s*["']([A-Za-z_][A-Za-z0-9_.\-]*)["']\s*,"#,
    r#"\s*["']?in["']?\s*:\s*["'](?:query|path|header|cookie|formData)["'])"#,
);

// The value names the field the token travels in: `csrfToken: "authenticity_token"`.
const SECURITY_FIELD: &str = concat!(
    r"(?i)\b(?:(?:csrf|xsrf)[_-]?(?:token|param|field)|api[_-]?key|access[_-]?token)",
    r#"(?:[_-]?name)?["']?\s*[:=]\s*["']([A-Za-z_][A-Za-z0-9_\-]{2,})["']"#,
);

const ENV_KEY: &str = concat!(
    r"(?:\b(?:process\.env|import\.meta\.env)\.([A-Za-z_][A-Za-z0-9_]*))",
    r#"|(?:\b(?:process\.env|ENV)\[\s*["']([A-Za-z_][A-Za-z0-9_]*)["']\s*\])"#,
);

const FRAMEWORK_BINDING: &str =
    r#"@(?:Input|Output|ViewChild)\s*\(\s*["']([A-Za-z_][A-Za-z0-9_]*)["']"#;

// Ends in the `{` that brace scanning starts from.
const NESTED_OBJECT_ANCHOR: &str = concat!(
    r"(?:\b(?:var|let|const)\s+[A-Za-z_$][A-Za-z0-9_$]*\s*=\s*",
    r"|JSON\.stringify\s*\(\s*|dataLayer\.push\s*\(\s*",
    r"|\b(?:config|settings|options|params|data|props|computed|methods)\s*[:=]\s*)\{",
);

const JS_DECLARATION: &str = concat!(
    r"(?:\b(?:var|let|const)\s+([A-Za-z_$][A-Za-z0-9_$]*))",
    r"|(?:\bwindow\.([A-Za-z_$][A-Za-z0-9_$]*)\s*=[^=])",
);

const JS_STORAGE: &str = concat!(
    r"(?:(?:localStorage|sessionStorage)\.(?:getItem|setItem|removeItem)",
    r"|Cookies\.(?:get|set|remove))",
    r#"\s*\(\s*["']([A-Za-z_][A-Za-z0-9_.\-]*)["']"#,
);

const FUNCTION_PARAMS: &str = concat!(
    r"(?:\bfunction\b\s*\*?\s*(?:[A-Za-z_$][A-Za-z0-9_$]*)?\s*\(([^()]*)\))",
    r"|(?:(?:\(([^()]*)\)|([A-Za-z_$][A-Za-z0-9_$]*))\s*=>)",
);

const JS_COMMENT: &str = r"(?m:(?:^|[\s;{}])//([^\r\n]*))|(?s:/\*(.*?)\*/)";

const LINK_ATTR: &str = r#"(?i)\b(?:href|action|src|formaction)\s*=\s*["']([^"'#\s]+)"#;

/// The fixed, ordered extraction rules. Compiled once, shared read-only.
pub struct RuleSet {
    rules: Vec<Rule>,
    base: Url,
    template: Regex,
}

impl RuleSet {
    pub fn new() -> Result<Self> {
        use Confidence::*;
        use SourceTag::*;

        let link_query = Matcher::LinkQuery(compile("link-query", LINK_ATTR)?);
        let link_path = Matcher::LinkPath(compile("link-path", LINK_ATTR)?);
        let nested = Matcher::NestedObject(compile("nested-object", NESTED_OBJECT_ANCHOR)?);

        let rules = vec![
            Rule::pattern("url-query", UrlQuery, High, URL_QUERY)?,
            Rule::pattern("form-field", FormField, High, FORM_FIELD)?.scoped(Scope::Markup),
            Rule::new("link-query", UrlQuery, High, link_query).scoped(Scope::Markup),
            Rule::pattern("script-param-access", UrlQuery, Medium, SCRIPT_PARAM_ACCESS)?,
            Rule::pattern("form-data", FormField, Medium, FORM_DATA)?,
            Rule::pattern("openapi-parameter", UrlQuery, Medium, OPENAPI_PARAMETER)?,
            Rule::pattern("security-field", FormField, Medium, SECURITY_FIELD)?,
            Rule::pattern("env-key", JsDeclaration, Medium, ENV_KEY)?,
            Rule::pattern("framework-binding", JsDeclaration, Medium, FRAMEWORK_BINDING)?,
            Rule::pattern("path-template", PathTemplate, Medium, PATH_TEMPLATE)?,
            Rule::pattern("route-param", PathTemplate, Medium, r"/:([A-Za-z_][A-Za-z0-9_]*)")?,
            Rule::pattern("json-key", JsonKey, Medium, r#""([A-Za-z_$][A-Za-z0-9_$.\-]*)"\s*:"#)?,
            Rule::new("json-document", JsonKey, Medium, Matcher::JsonDocument),
            Rule::new("nested-object", JsonKey, Medium, nested),
            Rule::pattern("html-id", HtmlAttribute, Medium, HTML_ID)?.scoped(Scope::Markup),
            Rule::pattern(
                "html-name",
                HtmlAttribute,
                Medium,
                r#"(?i)\bname\s*=\s*["']([A-Za-z0-9_.\-\[\]]+)["']"#,
            )?
            .scoped(Scope::Markup),
            Rule::pattern(
                "data-attribute",
                HtmlAttribute,
                Medium,
                r"\b(data-[A-Za-z][A-Za-z0-9\-]*)\s*=",
            )?
            .scoped(Scope::Markup),
            Rule::pattern("html-class", HtmlAttribute, Low, HTML_CLASS)?
                .scoped(Scope::Markup)
                .split(Split::Whitespace),
            Rule::pattern("xml-element", XmlAttribute, Medium, r"<([A-Za-z_][A-Za-z0-9_.\-]*)>")?
                .scoped(Scope::Xml),
            Rule::pattern(
                "xml-attribute",
                XmlAttribute,
                Medium,
                r#"\s([A-Za-z_][A-Za-z0-9_.\-]*)\s*=\s*["']"#,
            )?
            .scoped(Scope::Xml),
            Rule::pattern("js-declaration", JsDeclaration, Low, JS_DECLARATION)?,
            Rule::pattern(
                "js-destructuring",
                JsDeclaration,
                Low,
                r"\b(?:var|let|const)\s*(?:\{([^{}()]*)\}|\[([^\[\]()]*)\])\s*=",
            )?
            .split(Split::Comma),
            Rule::pattern(
                "js-property",
                JsDeclaration,
                Low,
                r#"([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::|\s=)\s*["'`]"#,
            )?,
            Rule::pattern("js-storage", JsDeclaration, Low, JS_STORAGE)?,
            Rule::pattern("function-params", JsFunctionParam, Low, FUNCTION_PARAMS)?
                .split(Split::Comma),
            Rule::new("link-path", PathSegment, Low, link_path).scoped(Scope::Markup),
            Rule::new(
                "html-comment",
                Comment,
                Low,
                Matcher::Comment {
                    body: compile("html-comment", r"(?s)<!--(.*?)-->")?,
                    token: compile("html-comment", COMMENT_TOKEN)?,
                },
            ),
            Rule::new(
                "js-comment",
                Comment,
                Low,
                Matcher::Comment {
                    body: compile("js-comment", JS_COMMENT)?,
                    token: compile("js-comment", COMMENT_TOKEN)?,
                },
            ),
        ];

        Ok(Self {
            rules,
            base: Url::parse("http://localhost/").map_err(|e| Error::Config(e.to_string()))?,
            template: compile("path-template", r"\{([A-Za-z_][A-Za-z0-9_]*)\}")?,
        })
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn extract(&self, content: &str, content_type: &str) -> Vec<RawCandidate> {
        let hint = ContentHint::parse(content_type);
        let mut out = Vec::new();
        for rule in &self.rules {
            if !hint.allows(rule.scope) {
                continue;
            }
            let before = out.len();
            self.apply(rule, content, hint, &mut out);
            if out.len() > before {
                trace!("rule {} yielded {} candidates", rule.name, out.len() - before);
            }
        }
        out
    }

    /// Query keys, `{name}` templates and path words of a URL identifier.
    pub fn extract_identifier(&self, identifier: &str) -> Vec<RawCandidate> {
        let mut out = Vec::new();
        if !is_url(identifier) {
            return out;
        }
        let Ok(url) = Url::parse(identifier.trim()) else {
            return out;
        };

        for (key, _) in url.query_pairs() {
            out.push(RawCandidate::new(key.into_owned(), SourceTag::UrlQuery, Confidence::High));
        }
        for caps in self.template.captures_iter(identifier) {
            if let Some(m) = first_group(&caps) {
                out.push(RawCandidate::new(m, SourceTag::PathTemplate, Confidence::Medium));
            }
        }
        push_path_segments(&url, &mut out);
        out
    }

    fn apply(&self, rule: &Rule, content: &str, hint: ContentHint, out: &mut Vec<RawCandidate>) {
        match &rule.matcher {
            Matcher::Pattern(re) => {
                for caps in re.captures_iter(content) {
                    if let Some(text) = first_group(&caps) {
                        emit(rule, text, out);
                    }
                }
            }
            Matcher::NestedObject(re) => {
                let bytes = content.as_bytes();
                for m in re.find_iter(content) {
                    let open = m.end() - 1;
                    let Some(close) = find_block_end(bytes, open) else {
                        continue;
                    };
                    for key in top_level_keys(&bytes[open..=close]) {
                        out.push(RawCandidate::new(key, rule.source, rule.confidence));
                    }
                }
            }
            Matcher::JsonDocument => {
                let body = content.trim();
                if !(hint.json || body.starts_with('{') || body.starts_with('[')) {
                    return;
                }
                if let Ok(value) = serde_json::from_str::<Value>(body) {
                    let mut keys = Vec::new();
                    collect_json_keys(&value, &mut keys);
                    for key in keys {
                        out.push(RawCandidate::new(key, rule.source, rule.confidence));
                    }
                }
            }
            Matcher::LinkQuery(re) => {
                for caps in re.captures_iter(content) {
                    let link = first_group(&caps);
                    let Some(url) = link.and_then(|link| resolve_link(&self.base, link)) else {
                        continue;
                    };
                    for (key, _) in url.query_pairs() {
                        out.push(RawCandidate::new(key.into_owned(), rule.source, rule.confidence));
                    }
                }
            }
            Matcher::LinkPath(re) => {
                for caps in re.captures_iter(content) {
                    let link = first_group(&caps);
                    if let Some(url) = link.and_then(|link| resolve_link(&self.base, link)) {
                        push_path_segments(&url, out);
                    }
                }
            }
            Matcher::Comment { body, token } => {
                for caps in body.captures_iter(content) {
                    let Some(text) = first_group(&caps) else {
                        continue;
                    };
                    for inner in token.captures_iter(text) {
                        if let Some(name) = first_group(&inner) {
                            out.push(RawCandidate::new(name, rule.source, rule.confidence));
                        }
                    }
                }
            }
        }
    }
}

// `key=` assignments, snake_case and camelCase words.
const COMMENT_TOKEN: &str = concat!(
    r"([A-Za-z_][A-Za-z0-9_]*)\s*=",
    r"|\b([a-z][a-z0-9]*(?:_[a-z0-9]+)+|[a-z][a-z0-9]*(?:[A-Z][a-z0-9]+)+)\b",
);

fn first_group<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    caps.iter().skip(1).flatten().next().map(|m| m.as_str())
}

fn emit(rule: &Rule, text: &str, out: &mut Vec<RawCandidate>) {
    match rule.split {
        Split::None => out.push(RawCandidate::new(text, rule.source, rule.confidence)),
        Split::Comma => {
            for item in split_list(text) {
                out.push(RawCandidate::new(item, rule.source, rule.confidence));
            }
        }
        Split::Whitespace => {
            for item in text.split_whitespace() {
                out.push(RawCandidate::new(item, rule.source, rule.confidence));
            }
        }
    }
}

fn collect_json_keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                out.push(key.clone());
                collect_json_keys(inner, out);
            }
        }
        Value::Array(items) => {
            for inner in items {
                collect_json_keys(inner, out);
            }
        }
        _ => {}
    }
}

fn push_path_segments(url: &Url, out: &mut Vec<RawCandidate>) {
    let Some(segments) = url.path_segments() else {
        return;
    };
    for segment in segments {
        if is_path_word(segment) {
            out.push(RawCandidate::new(segment, SourceTag::PathSegment, Confidence::Low));
        }
    }
}

// File names (`app.js`, `logo.png`) never qualify.
fn is_path_word(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    segment.len() >= 2 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
