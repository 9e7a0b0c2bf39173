//! Timed intervals and the two-phase accumulator classifiers write into.

use serde::Serialize;

use crate::event::Event;

/// One measured interval: boundary timestamps plus a signed cycle count.
///
/// For a plain pair the count is `end - start`. For a multi-hop series it
/// is the telescoping sum of the consecutive deltas, which can be smaller
/// than `end - start` when interior hops are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
    pub cycles: i64,
}

impl Interval {
    pub fn between(start: &Event, end: &Event) -> Self {
        Self {
            start: start.timestamp,
            end: end.timestamp,
            cycles: end.timestamp - start.timestamp,
        }
    }

    /// Collapse a chain of alternating boundary timestamps into one
    /// interval. Requires an even count of at least two; odd or empty
    /// chains yield `None`.
    pub fn series(stamps: &[i64]) -> Option<Self> {
        if stamps.len() < 2 || stamps.len() % 2 != 0 {
            return None;
        }
        let cycles = stamps
            .chunks_exact(2)
            .map(|pair| pair[1] - pair[0])
            .sum();
        Some(Self {
            start: stamps[0],
            end: stamps[stamps.len() - 1],
            cycles,
        })
    }

    /// A count-valued sample with no boundaries of its own.
    pub fn count(value: i64) -> Self {
        Self {
            start: 0,
            end: 0,
            cycles: value,
        }
    }
}

/// Whether a series measures clock cycles or a plain count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Cycles,
    Count,
}

/// Per-label accumulator with transactional semantics.
///
/// New intervals land in the pending buffer; the batch tracker either
/// promotes them with [`IntervalSet::commit`] or drops them with
/// [`IntervalSet::rollback`]. Only committed intervals survive into the
/// final series.
#[derive(Debug, Clone)]
pub struct IntervalSet {
    unit: MetricUnit,
    committed: Vec<Interval>,
    pending: Vec<Interval>,
}

impl IntervalSet {
    pub fn cycles() -> Self {
        Self::with_unit(MetricUnit::Cycles)
    }

    pub fn counts() -> Self {
        Self::with_unit(MetricUnit::Count)
    }

    fn with_unit(unit: MetricUnit) -> Self {
        Self {
            unit,
            committed: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, interval: Interval) {
        self.pending.push(interval);
    }

    pub fn commit(&mut self) {
        self.committed.append(&mut self.pending);
    }

    pub fn rollback(&mut self) {
        self.pending.clear();
    }

    pub fn committed(&self) -> &[Interval] {
        &self.committed
    }

    /// Seal the set into a labeled series, discarding whatever is still
    /// pending.
    pub fn into_series(self, label: impl Into<String>) -> LabeledSeries {
        LabeledSeries {
            label: label.into(),
            unit: self.unit,
            intervals: self.committed,
        }
    }
}

/// The committed output of one classifier under one label.
#[derive(Debug, Clone)]
pub struct LabeledSeries {
    pub label: String,
    pub unit: MetricUnit,
    pub intervals: Vec<Interval>,
}
