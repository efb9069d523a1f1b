use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use rayon::ThreadPoolBuilder;

use crate::aggregate::{Aggregator, LengthBounds};
use crate::classify::{ClassifiedParameter, Classifier};
use crate::cleaner::Cleaner;
use crate::dedup::dedupe;
use crate::error::Result;
use crate::extract::RuleSet;
use crate::fetch::Fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub workers: usize,
    pub bounds: LengthBounds,
    pub max_token_len: usize,
    pub timeout: Duration,
    pub delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            bounds: LengthBounds::default(),
            max_token_len: 100,
            timeout: Duration::from_secs(10),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Url(String),
    Document { identifier: String, content: String, content_type: String },
}

impl Input {
    pub fn identifier(&self) -> &str {
        match self {
            Input::Url(url) => url,
            Input::Document { identifier, .. } => identifier,
        }
    }
}

pub struct Engine {
    rules: RuleSet,
    cleaner: Cleaner,
    classifier: Classifier,
}

impl Engine {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        Ok(Self {
            rules: RuleSet::new()?,
            cleaner: Cleaner::new(config.max_token_len)?,
            classifier: Classifier::new()?,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn cleaner(&self) -> &Cleaner {
        &self.cleaner
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Identifier candidates come before content candidates.
    pub fn process_one(
        &self,
        identifier: &str,
        content: &str,
        content_type: &str,
    ) -> Vec<ClassifiedParameter> {
        let mut raw = self.rules.extract_identifier(identifier);
        raw.extend(self.rules.extract(content, content_type));

        let origin = (!identifier.is_empty()).then_some(identifier);
        let cleaned = raw
            .iter()
            .filter_map(|candidate| match self.cleaner.clean(candidate, origin) {
                Ok(param) => Some(param),
                Err(rejection) => {
                    trace!("{rejection}");
                    None
                }
            })
            .collect();

        dedupe(cleaned).into_iter().map(|p| self.classifier.classify_parameter(p)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub inputs: usize,
    pub failed: usize,
    pub discovered: usize,
    pub stored: usize,
}

#[derive(Default)]
struct Counters {
    inputs: AtomicUsize,
    failed: AtomicUsize,
    discovered: AtomicUsize,
    stored: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> RunStats {
        RunStats {
            inputs: self.inputs.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
        }
    }
}

/// Feeds `inputs` through a bounded queue to `workers` pool threads. Each
/// worker runs the whole pipeline for one input at a time and submits into
/// `sink`. A failed fetch is logged and counts as zero parameters.
pub fn run<I>(
    engine: &Engine,
    fetcher: &dyn Fetcher,
    inputs: I,
    workers: usize,
    sink: &Aggregator,
) -> Result<RunStats>
where
    I: IntoIterator<Item = Input>,
    I::IntoIter: Send,
{
    let workers = workers.max(1);
    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
    let (tx, rx) = crossbeam_channel::bounded::<Input>(workers * 4);
    let counters = Counters::default();
    let counters = &counters;
    let inputs = inputs.into_iter();

    thread::scope(|s| {
        s.spawn(move || {
            for input in inputs {
                if tx.send(input).is_err() {
                    break;
                }
            }
        });

        pool.scope(|scope| {
            for _ in 0..workers {
                let rx = rx.clone();
                scope.spawn(move |_| {
                    for input in rx.iter() {
                        counters.inputs.fetch_add(1, Ordering::Relaxed);
                        let Some(params) = analyse(engine, fetcher, input) else {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };
                        counters.discovered.fetch_add(params.len(), Ordering::Relaxed);
                        for param in params {
                            if sink.submit(param) {
                                counters.stored.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                });
            }
        });
    });

    Ok(counters.snapshot())
}

fn analyse(
    engine: &Engine,
    fetcher: &dyn Fetcher,
    input: Input,
) -> Option<Vec<ClassifiedParameter>> {
    match input {
        Input::Url(url) => match fetcher.fetch(&url) {
            Ok(fetched) => {
                let params = engine.process_one(&url, &fetched.body, &fetched.content_type);
                debug!("{url}: {} parameters", params.len());
                Some(params)
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        },
        Input::Document { identifier, content, content_type } => {
            let params = engine.process_one(&identifier, &content, &content_type);
            debug!("{identifier}: {} parameters", params.len());
            Some(params)
        }
    }
}
