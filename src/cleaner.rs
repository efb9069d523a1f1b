use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::extract::{Confidence, RawCandidate, SourceTag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedParameter {
    pub name: String,
    pub confidence: Confidence,
    pub source: SourceTag,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject,
    Transform(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub rule: &'static str,
    pub token: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` rejected by {}", self.token, self.rule)
    }
}

type Eval = Box<dyn Fn(&str) -> Verdict + Send + Sync>;

pub struct Step {
    pub rule: &'static str,
    eval: Eval,
}

impl Step {
    fn new(rule: &'static str, eval: impl Fn(&str) -> Verdict + Send + Sync + 'static) -> Self {
        Self { rule, eval: Box::new(eval) }
    }

    fn reject_if(rule: &'static str, pred: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::new(rule, move |token| if pred(token) { Verdict::Reject } else { Verdict::Pass })
    }

    fn reject_matching(rule: &'static str, re: Regex) -> Self {
        Self::reject_if(rule, move |token| re.is_match(token))
    }

    pub fn evaluate(&self, token: &str) -> Verdict {
        (self.eval)(token)
    }
}

const SHORT_ALLOW: &[&str] = &[
    "q", "s", "p", "u", "r", "t", "c", "e", "v", "k", "l", "n", "f", "a", "b", "d", "h", "i", "m",
    "o", "w", "x", "y", "z", "id", "to", "by", "ip", "pg", "no", "ts", "cb", "fn", "op", "do", "v1",
    "v2", "v3", "s3", "h1", "h2", "x1", "y1", "x2", "y2",
];

const LANGUAGE_LITERALS: &[&str] = &[
    "true", "false", "null", "undefined", "nan", "infinity", "this", "function", "return", "var",
    "let", "const", "typeof", "instanceof", "void", "async", "await", "yield", "if", "else",
    "while", "for", "switch", "case", "break", "continue", "try", "catch", "finally", "throw",
    "new", "delete", "in", "of",
];

// Markup and UI vocabulary that floods class, id and comment extraction.
// Short tokens on the allow-list above are deliberately absent.
const COMMON_WORDS: &[&str] = &[
    "an", "the", "and", "or", "but", "on", "at", "with", "from", "up", "about", "into", "through",
    "during", "before", "after", "div", "span", "h3", "h4", "h5", "h6", "ul", "ol", "li", "table",
    "tr", "td", "th", "thead", "tbody", "form", "input", "button", "select", "option", "textarea",
    "label", "img", "svg", "path", "container", "content", "wrapper", "header", "footer", "main",
    "nav", "section", "article", "aside", "menu", "sidebar", "hidden", "visible", "block", "inline",
    "flex", "grid", "relative", "absolute", "fixed", "static", "left", "right", "center", "top",
    "bottom", "active", "inactive", "disabled", "enabled", "selected", "checked", "expanded",
    "collapsed", "red", "blue", "green", "yellow", "black", "white", "gray", "grey", "dark",
    "light", "small", "medium", "large", "xl", "xs", "sm", "md", "lg", "show", "hide", "toggle",
    "click", "hover", "focus", "load", "ready", "change", "submit", "reset", "close", "open",
    "start", "stop", "play", "pause", "end", "begin", "finish", "none", "auto", "inherit",
    "initial", "unset", "revert", "yes", "ok", "cancel", "done", "edit", "view", "save", "remove",
    "add", "create", "update", "modify", "copy", "paste", "cut", "undo", "redo", "clear", "class",
    "extends", "import", "export", "react", "vue", "angular", "jquery", "bootstrap", "component",
    "props", "state", "render", "mount", "unmount", "lifecycle",
];

const ARTIFACT_SHAPES: &[&str] = &[
    r"^(?:css|emotion)-[0-9a-z]{4,}$",
    r"^sc-[A-Za-z]{4,}$",
    r"^__\w+__$",
    r"^webpackChunk",
    r"^__webpack_",
    r"^_ngcontent-",
    r"^_nghost-",
    r"^ng-tns-",
    r"^v-[0-9a-f]{8}$",
    r"^jsx-\d+$",
    r"^svelte-[0-9a-z]{5,}$",
    // CSS modules: `name__hash`
    r"^[A-Za-z][\w-]*__[A-Za-z0-9_-]{5}$",
];

/// Ordered accept/reject/rewrite chain over raw candidate tokens.
///
/// The first step that rejects ends evaluation. A `Transform` replaces the
/// token and evaluation continues with the next step on the new value.
pub struct Cleaner {
    steps: Vec<Step>,
}

fn compile(rule: &'static str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::Rule { rule, source })
}

impl Cleaner {
    pub fn new(max_len: usize) -> Result<Self> {
        let numeric = compile("numeric", r"^[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?$")?;
        let css_negative =
            compile("css-negative", r"^-\d*\.?\d+[a-zA-Z%]*$|^-(?:webkit|moz|ms|o)-")?;
        let container_hash =
            compile("container-hash", r"(?i)^[a-z][a-z0-9]*[-_]([0-9a-f]{10,})$")?;
        let hex = compile("random-hex", r"^[0-9a-fA-F]{16,}$")?;
        let artifact = compile("framework-artifact", &ARTIFACT_SHAPES.join("|"))?;
        let asset =
            compile("asset-shape", r"^v(?:19|20)\d{2}\d*$|^build\d{8,}$|^[A-Za-z_]?\d{10,}$")?;

        let steps = vec![
            Step::new("empty", |token| {
                let trimmed = token.trim();
                if trimmed.is_empty() {
                    Verdict::Reject
                } else if trimmed.len() != token.len() {
                    Verdict::Transform(trimmed.to_string())
                } else {
                    Verdict::Pass
                }
            }),
            Step::reject_matching("numeric", numeric),
            Step::reject_matching("css-negative", css_negative),
            Step::new("custom-property", |token| match token.strip_prefix("--") {
                Some(rest) if rest.chars().count() <= 1 => Verdict::Reject,
                Some(rest) => Verdict::Transform(rest.to_string()),
                None => Verdict::Pass,
            }),
            Step::reject_if("charset", |token| !valid_charset(token)),
            Step::reject_if("container-hash", move |token| {
                container_hash
                    .captures(token)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().bytes().any(|b| b.is_ascii_digit()))
                    .unwrap_or(false)
            }),
            Step::reject_matching("random-hex", hex),
            Step::reject_matching("framework-artifact", artifact),
            Step::reject_if("language-literal", |token| {
                let lower = token.to_ascii_lowercase();
                LANGUAGE_LITERALS.contains(&lower.as_str())
            }),
            Step::reject_if("common-word", |token| {
                let lower = token.to_ascii_lowercase();
                COMMON_WORDS.contains(&lower.as_str())
            }),
            Step::reject_if("short-token", |token| !short_token_allowed(token)),
            Step::reject_matching("asset-shape", asset),
            Step::reject_if("max-length", move |token| token.chars().count() > max_len),
        ];

        Ok(Self { steps })
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn clean_token(&self, token: &str) -> std::result::Result<String, Rejection> {
        let mut current = token.to_string();
        for step in &self.steps {
            match step.evaluate(&current) {
                Verdict::Pass => {}
                Verdict::Reject => return Err(Rejection { rule: step.rule, token: current }),
                Verdict::Transform(next) => current = next,
            }
        }
        Ok(current)
    }

    pub fn clean(
        &self,
        candidate: &RawCandidate,
        origin: Option<&str>,
    ) -> std::result::Result<CleanedParameter, Rejection> {
        let name = self.clean_token(&candidate.text)?;
        Ok(CleanedParameter {
            name,
            confidence: candidate.confidence,
            source: candidate.source,
            origin: origin.map(str::to_string),
        })
    }
}

fn valid_charset(token: &str) -> bool {
    let bytes = token.as_bytes();
    let (Some(&first), Some(&last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let first_ok = first.is_ascii_alphabetic() || first == b'_' || first == b'$';
    let last_ok = last.is_ascii_alphanumeric() || matches!(last, b'_' | b'$' | b']');
    first_ok
        && last_ok
        && bytes
            .iter()
            .all(|&b| {
                b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.' | b'-' | b'[' | b']')
            })
}

// Letter plus digit pairs (`a1`, `x9`) are noise unless allow-listed.
fn short_token_allowed(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    match bytes {
        [] => false,
        [_] => SHORT_ALLOW.contains(&lower.as_str()),
        [a, b] if a.is_ascii_alphabetic() && b.is_ascii_digit() => {
            SHORT_ALLOW.contains(&lower.as_str())
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> Cleaner {
        Cleaner::new(100).unwrap()
    }

    fn rejected_by(token: &str) -> Option<&'static str> {
        cleaner().clean_token(token).err().map(|r| r.rule)
    }

    #[test]
    fn documented_examples() {
        let c = cleaner();
        assert_eq!(c.clean_token("-45deg").unwrap_err().rule, "css-negative");
        assert_eq!(c.clean_token("--primary-color").unwrap(), "primary-color");
        assert_eq!(c.clean_token("a1ffb23c9d0e1f2a").unwrap_err().rule, "random-hex");
        assert_eq!(c.clean_token("q").unwrap(), "q");
    }

    #[test]
    fn numeric_and_whitespace() {
        assert_eq!(rejected_by("   "), Some("empty"));
        assert_eq!(rejected_by("42"), Some("numeric"));
        assert_eq!(rejected_by("-3.5e10"), Some("numeric"));
        assert_eq!(cleaner().clean_token("  page ").unwrap(), "page");
        assert_eq!(rejected_by("user name"), Some("charset"));
    }

    #[test]
    fn css_shapes() {
        assert_eq!(rejected_by("-webkit-transform"), Some("css-negative"));
        assert_eq!(rejected_by("-10px"), Some("css-negative"));
        assert_eq!(rejected_by("--x"), Some("custom-property"));
        assert_eq!(rejected_by("container-a1b2c3d4e5f6"), Some("container-hash"));
        let kept = cleaner().clean_token("container-abcdefabcdef").unwrap();
        assert_eq!(kept, "container-abcdefabcdef");
    }

    #[test]
    fn framework_artifacts() {
        let tokens = [
            "css-1x2y3z",
            "sc-bdVaJa",
            "emotion-8kd0w2",
            "__proto__",
            "webpackChunkapp",
            "_ngcontent-c12",
            "v-7ba5bd90",
            "jsx-123456",
            "svelte-1uhd6x3",
        ];
        for token in tokens {
            let rule = rejected_by(token);
            assert!(rule.is_some(), "{token} survived");
        }
        assert_eq!(rejected_by("webpackChunkapp"), Some("framework-artifact"));
        assert_eq!(rejected_by("undefined"), Some("language-literal"));
    }

    #[test]
    fn markup_vocabulary_is_dropped() {
        for token in ["container", "Hidden", "active", "flex", "left", "wrapper", "xs", "props"] {
            assert_eq!(rejected_by(token), Some("common-word"), "{token}");
        }
        for token in ["to", "by", "no", "h1", "p", "containerId", "pathname"] {
            assert!(cleaner().clean_token(token).is_ok(), "{token} was dropped");
        }
    }

    #[test]
    fn short_tokens() {
        assert_eq!(rejected_by("a1"), Some("short-token"));
        assert!(cleaner().clean_token("id").is_ok());
        assert!(cleaner().clean_token("v2").is_ok());
        assert!(cleaner().clean_token("db").is_ok());
        assert!(cleaner().clean_token("g").is_err());
    }

    #[test]
    fn asset_shapes_and_length() {
        assert_eq!(rejected_by("v2023"), Some("asset-shape"));
        assert_eq!(rejected_by("build20230101"), Some("asset-shape"));
        assert_eq!(rejected_by("t1700000000"), Some("asset-shape"));
        let short = Cleaner::new(5).unwrap();
        assert_eq!(short.clean_token("toolong").unwrap_err().rule, "max-length");
    }

    #[test]
    fn accepted_tokens_are_stable_on_second_pass() {
        let c = cleaner();
        let tokens =
            ["--primary-color", "user_id", "items[0]", "$scope", "q", "returnUrl", "data-id"];
        for token in tokens {
            let once = c.clean_token(token).unwrap();
            assert_eq!(c.clean_token(&once).unwrap(), once);
        }
    }

    #[test]
    fn clean_carries_metadata() {
        let cand = RawCandidate::new("userId", SourceTag::JsFunctionParam, Confidence::Low);
        let p = cleaner().clean(&cand, Some("https://example.com")).unwrap();
        assert_eq!(p.name, "userId");
        assert_eq!(p.confidence, Confidence::Low);
        assert_eq!(p.origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn steps_keep_their_order() {
        let names: Vec<&str> = cleaner().steps().map(|s| s.rule).collect();
        assert_eq!(names.first(), Some(&"empty"));
        assert_eq!(names.last(), Some(&"max-length"));
        let numeric = names.iter().position(|n| *n == "numeric").unwrap();
        let charset = names.iter().position(|n| *n == "charset").unwrap();
        assert!(numeric < charset);
    }
}
