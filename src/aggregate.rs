use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use clap::ValueEnum;

use crate::classify::{ClassifiedParameter, VulnCategory};
use crate::dedup::identity_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortOrder {
    /// Order in which names were first seen.
    #[default]
    Discovery,
    /// Case-insensitive alphabetical.
    Alpha,
    /// Shortest first.
    Length,
    /// Suspicious names first, then alphabetical.
    #[value(name = "sus")]
    Suspicious,
}

/// Inclusive, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

impl LengthBounds {
    pub fn admits(&self, name: &str) -> bool {
        let len = name.chars().count();
        len >= self.min && len <= self.max
    }
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self { min: 1, max: 30 }
    }
}

struct Entry {
    seq: u64,
    param: ClassifiedParameter,
}

#[derive(Default)]
struct ResultSet {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

/// Thread-safe sink for classified parameters from concurrent inputs.
///
/// Holds one entry per case-insensitive name. The first submission wins and
/// later duplicates are ignored, so casing, origin and confidence stay with
/// whoever got there first.
pub struct Aggregator {
    inner: Mutex<ResultSet>,
    bounds: LengthBounds,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub suspicious: usize,
    pub by_category: BTreeMap<VulnCategory, usize>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} parameters, {} suspicious", self.total, self.suspicious)?;
        if !self.by_category.is_empty() {
            let parts: Vec<String> =
                self.by_category.iter().map(|(cat, n)| format!("{cat}={n}")).collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

impl Aggregator {
    pub fn new(bounds: LengthBounds) -> Self {
        Self { inner: Mutex::new(ResultSet::default()), bounds }
    }

    pub fn submit(&self, param: ClassifiedParameter) -> bool {
        if !self.bounds.admits(param.name()) {
            return false;
        }
        let key = identity_key(param.name());
        let Ok(mut guard) = self.inner.lock() else {
            return false;
        };
        if guard.entries.contains_key(&key) {
            return false;
        }
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.entries.insert(key, Entry { seq, param });
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self, order: SortOrder) -> Vec<ClassifiedParameter> {
        let mut rows: Vec<(u64, ClassifiedParameter)> = match self.inner.lock() {
            Ok(guard) => guard.entries.values().map(|e| (e.seq, e.param.clone())).collect(),
            Err(_) => return Vec::new(),
        };

        rows.sort_by_key(|(seq, _)| *seq);
        match order {
            SortOrder::Discovery => {}
            SortOrder::Alpha => rows.sort_by(|(_, a), (_, b)| alpha(a, b)),
            SortOrder::Length => rows.sort_by(|(_, a), (_, b)| {
                let by_len = a.name().chars().count().cmp(&b.name().chars().count());
                by_len.then_with(|| alpha(a, b))
            }),
            SortOrder::Suspicious => rows.sort_by(|(_, a), (_, b)| {
                b.is_suspicious.cmp(&a.is_suspicious).then_with(|| alpha(a, b))
            }),
        }
        rows.into_iter().map(|(_, p)| p).collect()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        let Ok(guard) = self.inner.lock() else {
            return summary;
        };
        summary.total = guard.entries.len();
        for entry in guard.entries.values() {
            if entry.param.is_suspicious {
                summary.suspicious += 1;
            }
            if let Some(cat) = entry.param.category {
                *summary.by_category.entry(cat).or_insert(0) += 1;
            }
        }
        summary
    }
}

fn alpha(a: &ClassifiedParameter, b: &ClassifiedParameter) -> std::cmp::Ordering {
    identity_key(a.name()).cmp(&identity_key(b.name())).then_with(|| a.name().cmp(b.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::cleaner::CleanedParameter;
    use crate::extract::{Confidence, SourceTag};
    use std::sync::Arc;
    use std::thread;

    fn classified(name: &str, origin: &str, category: Option<VulnCategory>) -> ClassifiedParameter {
        ClassifiedParameter::new(
            CleanedParameter {
                name: name.to_string(),
                confidence: Confidence::Medium,
                source: SourceTag::JsonKey,
                origin: Some(origin.to_string()),
            },
            Classification { is_suspicious: category.is_some(), category },
        )
    }

    fn names(params: &[ClassifiedParameter]) -> Vec<&str> {
        params.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn first_writer_wins() {
        let agg = Aggregator::new(LengthBounds::default());
        assert!(agg.submit(classified("userId", "a", None)));
        assert!(!agg.submit(classified("USERID", "b", None)));
        let snap = agg.snapshot(SortOrder::Discovery);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name(), "userId");
        assert_eq!(snap[0].parameter.origin.as_deref(), Some("a"));
    }

    #[test]
    fn bounds_filter_before_storage() {
        let agg = Aggregator::new(LengthBounds { min: 2, max: 5 });
        assert!(!agg.submit(classified("q", "a", None)));
        assert!(!agg.submit(classified("toolong", "a", None)));
        assert!(agg.submit(classified("page", "a", None)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn sort_orders() {
        let agg = Aggregator::new(LengthBounds { min: 1, max: 50 });
        agg.submit(classified("zeta", "a", None));
        agg.submit(classified("Alpha", "a", None));
        agg.submit(classified("id", "a", Some(VulnCategory::Sqli)));
        agg.submit(classified("beta", "a", None));

        assert_eq!(names(&agg.snapshot(SortOrder::Discovery)), vec!["zeta", "Alpha", "id", "beta"]);
        assert_eq!(names(&agg.snapshot(SortOrder::Alpha)), vec!["Alpha", "beta", "id", "zeta"]);
        assert_eq!(names(&agg.snapshot(SortOrder::Length)), vec!["id", "beta", "zeta", "Alpha"]);
        let suspicious_first = agg.snapshot(SortOrder::Suspicious);
        assert_eq!(names(&suspicious_first), vec!["id", "Alpha", "beta", "zeta"]);
        // reads never reorder what is stored
        assert_eq!(names(&agg.snapshot(SortOrder::Discovery)), vec!["zeta", "Alpha", "id", "beta"]);
    }

    #[test]
    fn concurrent_duplicates_collapse() {
        let agg = Arc::new(Aggregator::new(LengthBounds::default()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agg = Arc::clone(&agg);
                thread::spawn(move || {
                    let name = if i % 2 == 0 { "token" } else { "TOKEN" };
                    agg.submit(classified(name, &format!("worker-{i}"), None))
                })
            })
            .collect();
        let stored = handles.into_iter().map(|h| h.join().unwrap()).filter(|s| *s).count();
        assert_eq!(stored, 1);
        assert_eq!(agg.snapshot(SortOrder::Discovery).len(), 1);
    }

    #[test]
    fn summary_counts_categories() {
        let agg = Aggregator::new(LengthBounds::default());
        agg.submit(classified("id", "a", Some(VulnCategory::Sqli)));
        agg.submit(classified("url", "a", Some(VulnCategory::FileInc)));
        agg.submit(classified("plain", "a", None));
        let summary = agg.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.suspicious, 2);
        assert_eq!(summary.by_category.get(&VulnCategory::Sqli), Some(&1));
        assert_eq!(summary.to_string(), "3 parameters, 2 suspicious (FILEINC=1, SQLI=1)");
    }
}
