use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::extract::ExtractionMethod;
use crate::input::InsertOutcome;

const DEFAULT_WINDOW_SIZE: usize = 256;
const EXTRACTION_P95_TARGET_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl MetricSummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            average_ms: 0,
            p95_ms: 0,
            max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionStats {
    pub succeeded: u64,
    pub given_up: u64,
    pub total_attempts: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub generated_at_ms: u64,
    pub extraction: MetricSummary,
    pub extraction_methods: BTreeMap<String, u64>,
    pub insertions: InsertionStats,
    pub buttons_inserted: u64,
    pub buttons_removed: u64,
    pub navigation_resets: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingMetric {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingMetric {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    fn summary(&self) -> MetricSummary {
        if self.values.is_empty() {
            return MetricSummary::empty();
        }

        let samples = self.values.len();
        let sum: u64 = self.values.iter().sum();
        let average_ms = sum / samples as u64;
        let max_ms = self.values.iter().copied().max().unwrap_or(0);

        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let p95_index = ((samples as f64 * 0.95).ceil() as usize)
            .saturating_sub(1)
            .min(samples - 1);

        MetricSummary {
            samples,
            average_ms,
            p95_ms: sorted[p95_index],
            max_ms,
        }
    }
}

/// Counters the overlay keeps about itself for the lifetime of the page
/// session.
#[derive(Debug)]
pub struct OverlayMetrics {
    extraction_ms: RollingMetric,
    extraction_methods: BTreeMap<String, u64>,
    insertions: InsertionStats,
    buttons_inserted: u64,
    buttons_removed: u64,
    navigation_resets: u64,
}

impl OverlayMetrics {
    pub fn new() -> Self {
        Self {
            extraction_ms: RollingMetric::new(DEFAULT_WINDOW_SIZE),
            extraction_methods: BTreeMap::new(),
            insertions: InsertionStats::default(),
            buttons_inserted: 0,
            buttons_removed: 0,
            navigation_resets: 0,
        }
    }

    pub fn record_extraction(&mut self, method: ExtractionMethod, elapsed_ms: u64) {
        self.extraction_ms.record(elapsed_ms);
        *self
            .extraction_methods
            .entry(method_key(method).to_string())
            .or_insert(0) += 1;
    }

    pub fn record_insertion(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Succeeded { attempts } => {
                self.insertions.succeeded += 1;
                self.insertions.total_attempts += u64::from(attempts);
            }
            InsertOutcome::GaveUp { attempts } => {
                self.insertions.given_up += 1;
                self.insertions.total_attempts += u64::from(attempts);
            }
        }
    }

    pub fn record_button_inserted(&mut self) {
        self.buttons_inserted += 1;
    }

    pub fn record_buttons_removed(&mut self, count: usize) {
        self.buttons_removed += count as u64;
    }

    pub fn record_navigation_reset(&mut self) {
        self.navigation_resets += 1;
    }

    pub fn report(&self) -> DiagnosticsReport {
        let extraction = self.extraction_ms.summary();

        let mut warnings = Vec::new();
        if self.insertions.given_up > 0 {
            warnings.push(format!(
                "Gave up on {} insertions after exhausting retries.",
                self.insertions.given_up
            ));
        }
        if extraction.samples > 0 && extraction.p95_ms > EXTRACTION_P95_TARGET_MS {
            warnings.push(format!(
                "Extraction P95 latency {}ms exceeded target {}ms.",
                extraction.p95_ms, EXTRACTION_P95_TARGET_MS
            ));
        }

        DiagnosticsReport {
            generated_at_ms: epoch_ms(),
            extraction,
            extraction_methods: self.extraction_methods.clone(),
            insertions: self.insertions.clone(),
            buttons_inserted: self.buttons_inserted,
            buttons_removed: self.buttons_removed,
            navigation_resets: self.navigation_resets,
            warnings,
        }
    }
}

impl Default for OverlayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

fn method_key(method: ExtractionMethod) -> &'static str {
    match method {
        ExtractionMethod::Proximity => "proximity",
        ExtractionMethod::AttributeSelector => "attributeSelector",
        ExtractionMethod::Fallback => "fallback",
    }
}
