//! Benchmark-window extraction.
//!
//! The harness writes a marker into the trace right before and right after
//! the benchmark run. The window is the part of the merged timeline
//! strictly between the markers, with a settle margin trimmed from each
//! end so warm-up and cool-down noise stays out of the statistics.

use serde::{Deserialize, Serialize};

use crate::clock::ClockConfig;
use crate::error::AnalysisError;
use crate::event::{Event, TRACING_MARK_WRITE};
use crate::timeline::MergedTimeline;

/// Settle margins, in seconds of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowMargins {
    pub begin_secs: f64,
    pub end_secs: f64,
}

impl Default for WindowMargins {
    fn default() -> Self {
        Self {
            begin_secs: 1.5,
            end_secs: 0.5,
        }
    }
}

/// Return the sub-slice of the timeline inside the marker pair, with the
/// margins applied.
///
/// Fails when the marker count is not exactly two, or when the margins
/// trim the window to nothing. Pure in its inputs: extracting twice with
/// the same margins yields the identical slice.
pub fn extract<'a>(
    timeline: &'a MergedTimeline,
    margins: &WindowMargins,
    clock: &ClockConfig,
) -> Result<&'a [Event], AnalysisError> {
    let range = extract_range(timeline, margins, clock)?;
    Ok(&timeline.events[range])
}

/// Like [`extract`], returning the index range into `timeline.events`.
pub fn extract_range(
    timeline: &MergedTimeline,
    margins: &WindowMargins,
    clock: &ClockConfig,
) -> Result<std::ops::Range<usize>, AnalysisError> {
    let markers: Vec<usize> = timeline
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.name == TRACING_MARK_WRITE)
        .map(|(i, _)| i)
        .collect();
    let &[begin, end] = markers.as_slice() else {
        return Err(AnalysisError::WindowMarkers {
            found: markers.len(),
        });
    };

    let lo = timeline.events[begin].timestamp + clock.cycles(margins.begin_secs);
    let hi = timeline.events[end].timestamp - clock.cycles(margins.end_secs);

    let inside = |e: &Event| lo < e.timestamp && e.timestamp < hi;
    let first = timeline.events[begin..=end].iter().position(inside);
    let Some(first) = first else {
        return Err(AnalysisError::EmptyWindow);
    };
    let last = timeline.events[begin..=end]
        .iter()
        .rposition(inside)
        .expect("a forward match implies a backward match");

    Ok(begin + first..begin + last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ReasonTable, Source};

    fn event(timestamp: i64, name: &str) -> Event {
        Event::new(
            Source::Host,
            "proc-1".into(),
            "002".into(),
            "d...".into(),
            timestamp,
            name.into(),
            "x".into(),
            &ReasonTable::builtin(),
        )
    }

    fn timeline(stamps: &[(i64, &str)]) -> MergedTimeline {
        MergedTimeline {
            events: stamps.iter().map(|(t, n)| event(*t, n)).collect(),
            tsc_offset: 0,
        }
    }

    // 1 MHz: one second of margin is exactly 1_000_000 cycles.
    fn clock() -> ClockConfig {
        ClockConfig::new(1.0).unwrap()
    }

    #[test]
    fn trims_margins_from_both_ends() {
        let t = timeline(&[
            (0, TRACING_MARK_WRITE),
            (1_000_000, "warmup"),
            (2_000_000, "steady_a"),
            (3_000_000, "steady_b"),
            (3_700_000, "cooldown"),
            (4_000_000, TRACING_MARK_WRITE),
        ]);
        let margins = WindowMargins {
            begin_secs: 1.5,
            end_secs: 0.5,
        };
        let window = extract(&t, &margins, &clock()).unwrap();
        let names: Vec<&str> = window.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["steady_a", "steady_b"]);
    }

    #[test]
    fn bounds_are_strict() {
        let t = timeline(&[
            (0, TRACING_MARK_WRITE),
            (1_000_000, "on_lower_bound"),
            (2_000_000, "inside"),
            (3_000_000, "on_upper_bound"),
            (4_000_000, TRACING_MARK_WRITE),
        ]);
        let margins = WindowMargins {
            begin_secs: 1.0,
            end_secs: 1.0,
        };
        let window = extract(&t, &margins, &clock()).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].name, "inside");
    }

    #[test]
    fn wrong_marker_count_is_fatal() {
        let margins = WindowMargins::default();
        let one = timeline(&[(0, TRACING_MARK_WRITE), (10, "x")]);
        assert!(matches!(
            extract(&one, &margins, &clock()),
            Err(AnalysisError::WindowMarkers { found: 1 })
        ));
        let three = timeline(&[
            (0, TRACING_MARK_WRITE),
            (10, TRACING_MARK_WRITE),
            (20, TRACING_MARK_WRITE),
        ]);
        assert!(matches!(
            extract(&three, &margins, &clock()),
            Err(AnalysisError::WindowMarkers { found: 3 })
        ));
    }

    #[test]
    fn over_trimmed_window_is_fatal() {
        let t = timeline(&[
            (0, TRACING_MARK_WRITE),
            (500_000, "only_event"),
            (1_000_000, TRACING_MARK_WRITE),
        ]);
        let margins = WindowMargins {
            begin_secs: 1.0,
            end_secs: 1.0,
        };
        assert!(matches!(
            extract(&t, &margins, &clock()),
            Err(AnalysisError::EmptyWindow)
        ));
    }

    #[test]
    fn extraction_is_idempotent() {
        let t = timeline(&[
            (0, TRACING_MARK_WRITE),
            (2_000_000, "a"),
            (2_500_000, "b"),
            (5_000_000, TRACING_MARK_WRITE),
        ]);
        let margins = WindowMargins::default();
        let first = extract_range(&t, &margins, &clock()).unwrap();
        let second = extract_range(&t, &margins, &clock()).unwrap();
        assert_eq!(first, second);
    }
}
