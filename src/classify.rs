use std::collections::HashSet;
use std::fmt;

use aho_corasick::AhoCorasick;
use serde::Serialize;

use crate::cleaner::CleanedParameter;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VulnCategory {
    Cmdi,
    FileInc,
    Sqli,
    Ssrf,
    Ssti,
    Xss,
    Idor,
    OpenRedirect,
    Debug,
    MassAssign,
}

impl VulnCategory {
    /// Evaluation order. Earlier categories win ties.
    pub const ALL: [VulnCategory; 10] = [
        VulnCategory::Cmdi,
        VulnCategory::FileInc,
        VulnCategory::Sqli,
        VulnCategory::Ssrf,
        VulnCategory::Ssti,
        VulnCategory::Xss,
        VulnCategory::Idor,
        VulnCategory::OpenRedirect,
        VulnCategory::Debug,
        VulnCategory::MassAssign,
    ];

    pub fn label(self) -> &'static str {
        match self {
            VulnCategory::Cmdi => "CMDI",
            VulnCategory::FileInc => "FILEINC",
            VulnCategory::Sqli => "SQLI",
            VulnCategory::Ssrf => "SSRF",
            VulnCategory::Ssti => "SSTI",
            VulnCategory::Xss => "XSS",
            VulnCategory::Idor => "IDOR",
            VulnCategory::OpenRedirect => "OPENREDIRECT",
            VulnCategory::Debug => "DEBUG",
            VulnCategory::MassAssign => "MASSASSIGN",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            VulnCategory::Cmdi => "Command Injection",
            VulnCategory::FileInc => "File Inclusion",
            VulnCategory::Sqli => "SQL Injection",
            VulnCategory::Ssrf => "Server-Side Request Forgery",
            VulnCategory::Ssti => "Server-Side Template Injection",
            VulnCategory::Xss => "Cross-Site Scripting",
            VulnCategory::Idor => "Insecure Direct Object Reference",
            VulnCategory::OpenRedirect => "Open Redirect",
            VulnCategory::Debug => "Debug / Admin Functionality",
            VulnCategory::MassAssign => "Mass Assignment",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            VulnCategory::Cmdi => &[
                "execute", "dir", "daemon", "cli", "log", "cmd", "download", "ip", "upload",
            ],
            VulnCategory::FileInc => &[
                "root", "directory", "path", "style", "folder", "default-language", "url",
                "platform", "textdomain", "document", "template", "pg", "php_path", "doc", "type",
                "lang", "token", "name", "pdf", "file", "etc", "api", "app", "resource-type",
            ],
            VulnCategory::Sqli => &[
                "process", "string", "id", "referer", "password", "pwd", "field", "view", "sleep",
                "column", "log", "token", "sel", "select", "sort", "from", "search", "update",
                "pub_group_id", "row", "results", "role", "table", "multi_layer_map_list", "order",
                "filter", "params", "user", "fetch", "limit", "keyword", "email", "query", "c",
                "name", "where", "number", "phone_number", "delete", "report",
            ],
            VulnCategory::Ssrf => &[
                "sector_identifier_uri", "request_uris", "logo_uri", "jwks_uri", "start", "path",
                "domain", "source", "url", "site", "view", "template", "page", "show", "val",
                "dest", "metadata", "out", "feed", "navigation", "image_host", "uri", "next",
                "continue", "host", "window", "dir", "reference", "filename", "html", "to",
                "return", "open", "port", "stop", "validate", "resturl", "callback", "name", "data",
                "ip", "redirect",
            ],
            VulnCategory::Ssti => &[
                "preview", "activity", "id", "name", "content", "view", "template", "redirect",
            ],
            VulnCategory::Xss => &[
                "path", "admin", "class", "atb", "redirect_uri", "other", "utm_source", "currency",
                "dir", "title", "endpoint", "return_url", "users", "cookie", "state", "callback",
                "militarybranch", "e", "referer", "password", "author", "body", "status",
                "utm_campaign", "value", "text", "search", "flaw", "vote", "pathname", "params",
                "user", "t", "utm_medium", "q", "email", "what", "file", "data-original",
                "description", "subject", "action", "u", "nickname", "color", "language_id", "auth",
                "samlresponse", "return", "readyfunction", "where", "tags", "cvo_sid1", "target",
                "format", "back", "term", "r", "id", "url", "view", "username", "sequel", "type",
                "city", "src", "p", "label", "ctx", "style", "html", "ad_type", "s", "issues",
                "query", "c", "shop", "redirect",
            ],
            VulnCategory::Idor => &[
                "count", "key", "user", "id", "extended_data", "uid2", "group", "team_id",
                "data-id", "no", "username", "email", "account", "doc", "uuid", "profile", "number",
                "user_id", "edit", "report", "order",
            ],
            VulnCategory::OpenRedirect => &[
                "u", "redirect_uri", "failed", "r", "referer", "return_url", "redirect_url",
                "prejoin_data", "continue", "redir", "return_to", "origin", "redirect_to", "next",
            ],
            VulnCategory::Debug => &[
                "test", "reset", "config", "shell", "admin", "exec", "load", "cfg", "dbg", "edit",
                "root", "create", "access", "disable", "alter", "make", "grant", "adm", "toggle",
                "execute", "clone", "delete", "enable", "rename", "debug", "modify",
            ],
            VulnCategory::MassAssign => &[
                "user", "profile", "role", "settings", "data", "attributes", "post", "comment",
                "order", "product", "form_fields", "request",
            ],
        }
    }
}

impl fmt::Display for VulnCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub is_suspicious: bool,
    pub category: Option<VulnCategory>,
}

impl Classification {
    fn hit(category: VulnCategory) -> Self {
        Self { is_suspicious: true, category: Some(category) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedParameter {
    pub parameter: CleanedParameter,
    pub is_suspicious: bool,
    pub category: Option<VulnCategory>,
}

impl ClassifiedParameter {
    pub fn new(parameter: CleanedParameter, classification: Classification) -> Self {
        Self {
            parameter,
            is_suspicious: classification.is_suspicious,
            category: classification.category,
        }
    }

    pub fn name(&self) -> &str {
        &self.parameter.name
    }
}

struct KeywordTable {
    category: VulnCategory,
    exact: HashSet<&'static str>,
    contained: AhoCorasick,
    keywords: &'static [&'static str],
}

/// Single-label keyword classifier, built once and shared read-only.
///
/// Exact membership is checked across every category first, in priority
/// order. Only when nothing matches exactly does substring containment run,
/// again in priority order.
pub struct Classifier {
    tables: Vec<KeywordTable>,
}

/// Reverse containment (`keyword` contains `name`) needs a name at least
/// this long, otherwise `e` or `id` would hit half the table.
const MIN_REVERSE_LEN: usize = 3;

impl Classifier {
    pub fn new() -> Result<Self> {
        let mut tables = Vec::with_capacity(VulnCategory::ALL.len());
        for category in VulnCategory::ALL {
            let keywords = category.keywords();
            let contained = AhoCorasick::new(keywords.iter().filter(|k| k.len() >= 2))
                .map_err(|source| Error::Keywords { category, source })?;
            let exact = keywords.iter().copied().collect();
            tables.push(KeywordTable { category, exact, contained, keywords });
        }
        Ok(Self { tables })
    }

    pub fn classify(&self, name: &str) -> Classification {
        let lower = name.to_lowercase();
        if lower.is_empty() {
            return Classification::default();
        }

        if let Some(table) = self.tables.iter().find(|t| t.exact.contains(lower.as_str())) {
            return Classification::hit(table.category);
        }

        self.tables
            .iter()
            .find(|t| {
                t.contained.is_match(&lower)
                    || (lower.len() >= MIN_REVERSE_LEN
                        && t.keywords.iter().any(|k| k.contains(lower.as_str())))
            })
            .map(|t| Classification::hit(t.category))
            .unwrap_or_default()
    }

    pub fn classify_parameter(&self, parameter: CleanedParameter) -> ClassifiedParameter {
        let classification = self.classify(&parameter.name);
        ClassifiedParameter::new(parameter, classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_earlier_substring() {
        let c = Classifier::new().unwrap();
        // "user_id" contains "id" (SQLI) but is an exact IDOR keyword.
        assert_eq!(c.classify("user_id").category, Some(VulnCategory::Idor));
        assert_eq!(c.classify("USER_ID").category, Some(VulnCategory::Idor));
    }

    #[test]
    fn priority_order_for_exact_hits() {
        let c = Classifier::new().unwrap();
        // "dir" is listed under CMDI, SSRF and XSS.
        assert_eq!(c.classify("dir").category, Some(VulnCategory::Cmdi));
        assert_eq!(c.classify("redirect_to").category, Some(VulnCategory::OpenRedirect));
        assert_eq!(c.classify("toggle").category, Some(VulnCategory::Debug));
    }

    #[test]
    fn substring_phase() {
        let c = Classifier::new().unwrap();
        assert_eq!(c.classify("cmdLine").category, Some(VulnCategory::Cmdi));
        assert_eq!(c.classify("sqlQueryString").category, Some(VulnCategory::Sqli));
        // reverse containment: "redi" sits inside the SSRF keyword "redirect"
        assert_eq!(c.classify("redi").category, Some(VulnCategory::Ssrf));
    }

    #[test]
    fn substring_guard_edges() {
        let c = Classifier::new().unwrap();
        // "ab" sits inside "table" but is too short to match in reverse.
        assert_eq!(c.classify("ab").category, None);
        assert_eq!(c.classify("tab").category, Some(VulnCategory::Sqli));
        // one-letter keywords such as "q" only ever match exactly
        assert_eq!(c.classify("zxq").category, None);
        assert_eq!(c.classify("q").category, Some(VulnCategory::Xss));
    }

    #[test]
    fn unmatched_names_are_clean() {
        let c = Classifier::new().unwrap();
        let result = c.classify("zzz");
        assert!(!result.is_suspicious);
        assert_eq!(result.category, None);
        assert_eq!(c.classify(""), Classification::default());
    }

    #[test]
    fn deterministic() {
        let c = Classifier::new().unwrap();
        for name in ["callback", "apiKey", "zzz", "Next"] {
            assert_eq!(c.classify(name), c.classify(name));
        }
    }

    #[test]
    fn labels_render_upper_case() {
        assert_eq!(VulnCategory::OpenRedirect.to_string(), "OPENREDIRECT");
        assert_eq!(serde_json::to_string(&VulnCategory::MassAssign).unwrap(), "\"MASSASSIGN\"");
        assert_eq!(VulnCategory::Sqli.description(), "SQL Injection");
    }
}
