//! Aggregated results: the input contract of the external report emitter.
//!
//! A [`Report`] maps every classifier label to its summary in both raw
//! cycles and microseconds, plus the boundary timestamps of the longest
//! single interval for diagnostic inspection. Composite metrics are linear
//! combinations over the already-aggregated per-label scalars, evaluated
//! with one selector (mean or median) held fixed across the whole report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{LabeledSeries, MetricUnit};
use crate::clock::ClockConfig;
use crate::stats::{extended_statistics, log2_histogram, ExtendedStats, Summary, UsecSummary};

/// Label under which the batch tracker reports trigger-to-trigger times.
pub const BATCH_LABEL: &str = "total_batch_time";

/// Which aggregate a composite (and the CSV rendering) reads per metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    Mean,
    #[default]
    Median,
}

/// One addend of a composite metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub label: String,
    pub coeff: f64,
}

/// A derived metric: `Σ coeff × selector(label)`, in microseconds.
///
/// Used to attribute leftover overhead to an otherwise unmeasured code
/// path, e.g. total transaction time minus the measured components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    pub name: String,
    pub terms: Vec<Term>,
}

/// An evaluated composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeValue {
    pub name: String,
    pub usecs: f64,
}

/// Boundary timestamps of the longest interval of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Longest {
    pub start: i64,
    pub end: i64,
}

/// Aggregates for one classifier label.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub unit: MetricUnit,
    pub cycles: Summary,
    pub usecs: UsecSummary,
    pub longest: Option<Longest>,
    #[serde(skip)]
    durations: Vec<i64>,
}

impl Metric {
    fn from_series(series: &LabeledSeries, clock: &ClockConfig) -> Self {
        let durations: Vec<i64> = series.intervals.iter().map(|iv| iv.cycles).collect();
        let cycles = Summary::of(&durations);
        let usecs = match series.unit {
            MetricUnit::Cycles => cycles.to_usecs(clock),
            MetricUnit::Count => cycles.unscaled(),
        };
        let longest = series
            .intervals
            .iter()
            .max_by_key(|iv| iv.cycles)
            .map(|iv| Longest {
                start: iv.start,
                end: iv.end,
            });
        Self {
            unit: series.unit,
            cycles,
            usecs,
            longest,
            durations,
        }
    }

    pub fn count(&self) -> usize {
        self.cycles.count
    }

    fn selected(&self, selector: Selector) -> f64 {
        match selector {
            Selector::Mean => self.usecs.mean,
            Selector::Median => self.usecs.median,
        }
    }

    /// Log2 latency histogram over the raw cycle durations.
    pub fn histogram(&self) -> Vec<(u32, usize)> {
        log2_histogram(&self.durations)
    }

    /// Extended statistics over the per-interval values (µs for cycle
    /// metrics, raw for count metrics).
    pub fn extended(&self, clock: &ClockConfig) -> Option<ExtendedStats> {
        let samples: Vec<f32> = match self.unit {
            MetricUnit::Cycles => self
                .durations
                .iter()
                .map(|&d| clock.cycles_to_usecs(d) as f32)
                .collect(),
            MetricUnit::Count => self.durations.iter().map(|&d| d as f32).collect(),
        };
        extended_statistics(&samples)
    }
}

/// The assembled result of one analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub cpu_mhz: f64,
    pub selector: Selector,
    pub metrics: BTreeMap<String, Metric>,
    pub composites: Vec<CompositeValue>,
}

impl Report {
    pub fn build(
        series: Vec<LabeledSeries>,
        clock: &ClockConfig,
        selector: Selector,
        composites: &[Composite],
    ) -> Self {
        let mut metrics = BTreeMap::new();
        for s in series {
            metrics.insert(s.label.clone(), Metric::from_series(&s, clock));
        }
        let mut report = Self {
            cpu_mhz: clock.cpu_mhz,
            selector,
            metrics,
            composites: Vec::new(),
        };
        report.composites = composites
            .iter()
            .map(|c| CompositeValue {
                name: c.name.clone(),
                usecs: report.evaluate(c),
            })
            .collect();
        report
    }

    /// The selector value for a label, zero when the metric is absent or
    /// empty (absence of data is not an error).
    pub fn selected_usecs(&self, label: &str) -> f64 {
        self.metrics
            .get(label)
            .map(|m| m.selected(self.selector))
            .unwrap_or(0.0)
    }

    /// Evaluate a composite against this report's selector.
    pub fn evaluate(&self, composite: &Composite) -> f64 {
        composite
            .terms
            .iter()
            .map(|t| t.coeff * self.selected_usecs(&t.label))
            .sum()
    }

    /// How often a metric fires per batch, rounded; `None` without batch
    /// data.
    pub fn per_batch_count(&self, label: &str) -> Option<f64> {
        let batches = self.metrics.get(BATCH_LABEL)?.count();
        if batches == 0 {
            return None;
        }
        let count = self.metrics.get(label)?.count();
        Some((count as f64 / batches as f64).round())
    }

    /// Labels ordered the way the table prints them: by count descending,
    /// then alphabetically.
    fn ordered_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        labels.sort_by_key(|l| {
            (
                std::cmp::Reverse(self.metrics[*l].count()),
                (*l).to_string(),
            )
        });
        labels
    }

    /// Render the composite CSV sheet: per-batch counts, the selector
    /// value for one occurrence, and the per-batch total.
    pub fn to_csv(&self) -> String {
        let selector = match self.selector {
            Selector::Mean => "mean",
            Selector::Median => "median",
        };
        let mut out = String::new();
        out.push_str(&format!("using,{}\n", selector));
        out.push_str("name,count per batch,one,total\n");
        for label in self.ordered_labels() {
            let metric = &self.metrics[label];
            let count = self
                .per_batch_count(label)
                .unwrap_or(metric.count() as f64);
            let one = metric.selected(self.selector);
            out.push_str(&format!(
                "{},{},{:.3},{:.3}\n",
                escape_csv(label),
                count,
                one,
                one * count
            ));
        }
        for composite in &self.composites {
            out.push_str(&format!(
                "{},1,{:.3},{:.3}\n",
                escape_csv(&composite.name),
                composite.usecs,
                composite.usecs
            ));
        }
        out
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<31}: {:<6} cycles {:>11} {:>11} {:>11} {:>11} usec: {:>7} {:>7} {:>7} {:>7}",
            "Event Name", "Count", "min", "max", "avg", "median", "min", "max", "avg", "median"
        )?;
        for label in self.ordered_labels() {
            let m = &self.metrics[label];
            let longest = m.longest.unwrap_or(Longest { start: 0, end: 0 });
            writeln!(
                f,
                "{:<31}: {:<6} cycles {:>11.2} {:>11.2} {:>11.2} {:>11.2} usec: {:>7.2} {:>7.2} {:>7.2} {:>7.2} longest: {}->{}",
                label,
                m.count(),
                m.cycles.min as f64,
                m.cycles.max as f64,
                m.cycles.mean,
                m.cycles.median,
                m.usecs.min,
                m.usecs.max,
                m.usecs.mean,
                m.usecs.median,
                longest.start,
                longest.end,
            )?;
        }
        for composite in &self.composites {
            writeln!(
                f,
                "{:<31}: {:<6} usec {:>7.2}",
                composite.name, "-", composite.usecs
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Interval, IntervalSet};

    fn series(label: &str, durations: &[(i64, i64)]) -> LabeledSeries {
        let mut set = IntervalSet::cycles();
        for &(start, end) in durations {
            set.push(Interval {
                start,
                end,
                cycles: end - start,
            });
        }
        set.commit();
        set.into_series(label)
    }

    fn clock() -> ClockConfig {
        ClockConfig::new(1000.0).unwrap()
    }

    fn build(series_list: Vec<LabeledSeries>, composites: &[Composite]) -> Report {
        Report::build(series_list, &clock(), Selector::Median, composites)
    }

    #[test]
    fn metric_summaries_in_cycles_and_usecs() {
        let report = build(
            vec![series("guest_xmit", &[(0, 1000), (100, 3100)])],
            &[],
        );
        let m = &report.metrics["guest_xmit"];
        assert_eq!(m.count(), 2);
        assert_eq!(m.cycles.min, 1000);
        assert_eq!(m.cycles.max, 3000);
        assert_eq!(m.usecs.min, 1.0);
        assert_eq!(m.usecs.max, 3.0);
    }

    #[test]
    fn missing_metric_reads_as_zero() {
        let report = build(vec![], &[]);
        assert_eq!(report.selected_usecs("nonexistent"), 0.0);
    }

    #[test]
    fn empty_metric_is_all_zero_not_an_error() {
        let report = build(vec![series("guest_recv_func", &[])], &[]);
        let m = &report.metrics["guest_recv_func"];
        assert_eq!(m.count(), 0);
        assert_eq!(m.cycles, Summary::zero());
        assert!(m.longest.is_none());
    }

    #[test]
    fn longest_interval_keeps_boundaries() {
        let report = build(
            vec![series("host_writev", &[(10, 40), (100, 900), (1000, 1010)])],
            &[],
        );
        let longest = report.metrics["host_writev"].longest.unwrap();
        assert_eq!((longest.start, longest.end), (100, 900));
    }

    #[test]
    fn composite_is_a_linear_combination() {
        let report = build(
            vec![
                series("guest_sendrecv_netperf", &[(0, 10_000)]),
                series("HW_exit", &[(0, 1000)]),
                series("HW_entry", &[(0, 2000)]),
            ],
            &[Composite {
                name: "guest other".into(),
                terms: vec![
                    Term {
                        label: "guest_sendrecv_netperf".into(),
                        coeff: 1.0,
                    },
                    Term {
                        label: "HW_exit".into(),
                        coeff: -1.0,
                    },
                    Term {
                        label: "HW_entry".into(),
                        coeff: -1.0,
                    },
                ],
            }],
        );
        // 10.0 - 1.0 - 2.0 µs
        assert_eq!(report.composites[0].usecs, 7.0);
    }

    #[test]
    fn composite_with_missing_label_treats_it_as_zero() {
        let report = build(
            vec![series("guest_sendrecv_netperf", &[(0, 10_000)])],
            &[Composite {
                name: "leftover".into(),
                terms: vec![
                    Term {
                        label: "guest_sendrecv_netperf".into(),
                        coeff: 1.0,
                    },
                    Term {
                        label: "never_measured".into(),
                        coeff: -1.0,
                    },
                ],
            }],
        );
        assert_eq!(report.composites[0].usecs, 10.0);
    }

    #[test]
    fn per_batch_count_rounds() {
        let report = build(
            vec![
                series(BATCH_LABEL, &[(0, 100), (100, 200)]),
                series("host_writev", &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]),
            ],
            &[],
        );
        assert_eq!(report.per_batch_count("host_writev"), Some(3.0));
        assert_eq!(report.per_batch_count("absent"), None);
    }

    #[test]
    fn table_lists_biggest_metrics_first() {
        let report = build(
            vec![
                series("rare", &[(0, 10)]),
                series("common", &[(0, 10), (10, 20), (20, 30)]),
            ],
            &[],
        );
        let text = report.to_string();
        let rare = text.find("rare").unwrap();
        let common = text.find("common").unwrap();
        assert!(common < rare);
        assert!(text.starts_with("Event Name"));
    }

    #[test]
    fn csv_quotes_fields_with_delimiters() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn csv_sheet_has_header_and_rows() {
        let report = build(vec![series("guest_xmit", &[(0, 1000)])], &[]);
        let csv = report.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("using,median"));
        assert_eq!(lines.next(), Some("name,count per batch,one,total"));
        assert!(lines.next().unwrap().starts_with("guest_xmit,1,"));
    }
}
