//! Process-wide metric registry.
//!
//! The recording functions are always callable. Values are only retained
//! when the crate is built with the `telemetry` feature; otherwise every call
//! compiles down to nothing and [`snapshot`] returns an empty view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod tags;
pub mod worker;

/// Summary of every sample recorded under one histogram name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Point-in-time copy of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Adds `value` to a counter. Labels are accepted for call-site readability
/// and are not stored.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let entry = metrics.counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    });

    let _ = (name, value);
}

#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| metrics.histograms.entry(name).or_default().record(value));

    let _ = (name, value);
}

#[inline]
pub fn set_gauge(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        metrics.gauges.insert(name, value);
    });

    let _ = (name, value);
}

#[inline]
pub fn add_gauge(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let entry = metrics.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_add(delta);
    });

    let _ = (name, delta);
}

/// Subtracts `delta` from a gauge, stopping at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::with(|metrics| {
        let entry = metrics.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_sub(delta);
    });

    let _ = (name, delta);
}

pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::snapshot()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};

    #[derive(Debug, Clone, Copy, Default)]
    pub(super) struct Histogram {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl Histogram {
        pub(super) fn record(&mut self, value: u64) {
            if self.count == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        fn summary(&self) -> HistogramSnapshot {
            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean: if self.count == 0 {
                    0.0
                } else {
                    self.total as f64 / self.count as f64
                },
            }
        }
    }

    #[derive(Debug, Default)]
    pub(super) struct Metrics {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) gauges: BTreeMap<&'static str, u64>,
        pub(super) histograms: BTreeMap<&'static str, Histogram>,
    }

    fn store() -> &'static Mutex<Metrics> {
        static STORE: OnceLock<Mutex<Metrics>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(Metrics::default()))
    }

    pub(super) fn with<R>(f: impl FnOnce(&mut Metrics) -> R) -> R {
        let mut guard = match store().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        with(|metrics| TelemetrySnapshot {
            counters: metrics
                .counters
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            gauges: metrics
                .gauges
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            histograms: metrics
                .histograms
                .iter()
                .map(|(name, histogram)| ((*name).to_owned(), histogram.summary()))
                .collect(),
        })
    }
}
