//! Batch segmentation with atomic commit/rollback.
//!
//! One trigger event (a halt exit or a kick-annotated exit) closes the
//! current batch and opens the next. A batch containing any blacklisted
//! event (a spurious timer interrupt, an unrelated IPI) is rolled back in
//! lock-step across every classifier, so transient noise discards that
//! batch's measurements instead of contaminating the steady-state
//! statistics. The tracker also measures the batches themselves: the
//! trigger-to-trigger time and the number of events per batch.

use std::collections::HashSet;

use super::interval::{Interval, IntervalSet, LabeledSeries};
use crate::event::{Event, KVM_EXIT};

/// What the engine must do to every classifier after one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    None,
    Commit,
    Rollback,
}

pub struct BatchTracker {
    halt_reason: String,
    kick_reason: String,
    blacklist: HashSet<String>,
    /// Once a kick trigger is seen, halt exits stop being triggers.
    ignore_halt: bool,
    dirty: bool,
    last_trigger: Option<i64>,
    events_in_span: i64,
    batch_times: IntervalSet,
    batch_counts: IntervalSet,
}

impl BatchTracker {
    pub fn new(
        halt_reason: impl Into<String>,
        kick_reason: impl Into<String>,
        blacklist: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            halt_reason: halt_reason.into(),
            kick_reason: kick_reason.into(),
            blacklist: blacklist.into_iter().collect(),
            ignore_halt: false,
            dirty: false,
            last_trigger: None,
            events_in_span: 0,
            batch_times: IntervalSet::cycles(),
            batch_counts: IntervalSet::counts(),
        }
    }

    fn is_trigger(&mut self, event: &Event, note: Option<&Event>) -> bool {
        if event.name != KVM_EXIT {
            return false;
        }
        let kicked = note.is_some_and(|n| n.reason.contains(&self.kick_reason));
        if kicked {
            self.ignore_halt = true;
        }
        kicked || (!self.ignore_halt && event.reason.contains(&self.halt_reason))
    }

    /// Watch one event; returns the action the engine must apply to every
    /// classifier.
    pub fn observe(&mut self, event: &Event, note: Option<&Event>) -> BatchAction {
        self.events_in_span += 1;
        if self.blacklist.contains(event.name.as_str()) {
            self.dirty = true;
        }
        if !self.is_trigger(event, note) {
            return BatchAction::None;
        }

        if let Some(start) = self.last_trigger {
            self.batch_times.push(Interval {
                start,
                end: event.timestamp,
                cycles: event.timestamp - start,
            });
            self.batch_counts.push(Interval::count(self.events_in_span));
        }
        let action = self.seal_span();
        self.last_trigger = Some(event.timestamp);
        action
    }

    /// Close the span still open at the end of the window.
    pub fn close(&mut self) -> BatchAction {
        self.seal_span()
    }

    fn seal_span(&mut self) -> BatchAction {
        let action = if self.dirty {
            self.batch_times.rollback();
            self.batch_counts.rollback();
            BatchAction::Rollback
        } else {
            self.batch_times.commit();
            self.batch_counts.commit();
            BatchAction::Commit
        };
        self.dirty = false;
        self.events_in_span = 0;
        action
    }

    pub fn finish(self) -> Vec<LabeledSeries> {
        vec![
            self.batch_times.into_series("total_batch_time"),
            self.batch_counts.into_series("events_per_batch"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ReasonTable, Source, KVM_MMIO};

    fn host(timestamp: i64, name: &str, info: &str) -> Event {
        Event::new(
            Source::Host,
            "qemu-system-x86-1123".into(),
            "002".into(),
            "d...".into(),
            timestamp,
            name.into(),
            info.into(),
            &ReasonTable::builtin(),
        )
    }

    fn halt_exit(timestamp: i64) -> Event {
        host(timestamp, KVM_EXIT, "reason HLT rip 0 info 0 0")
    }

    fn kick_note() -> Event {
        host(0, KVM_MMIO, "mmio write len 4 gpa 0xfebc0034 val 0x1")
    }

    fn tracker() -> BatchTracker {
        BatchTracker::new("HLT", "KICK", vec!["local_timer_entry".to_string()])
    }

    #[test]
    fn clean_batch_commits() {
        let mut t = tracker();
        assert_eq!(t.observe(&halt_exit(100), None), BatchAction::Commit);
        assert_eq!(t.observe(&host(150, "sys_read", "fd: 11"), None), BatchAction::None);
        assert_eq!(t.observe(&halt_exit(400), None), BatchAction::Commit);
        let series = t.finish();
        assert_eq!(series[0].label, "total_batch_time");
        assert_eq!(series[0].intervals, vec![Interval {
            start: 100,
            end: 400,
            cycles: 300
        }]);
        // halt + read + halt fell inside the measured batch
        assert_eq!(series[1].intervals[0].cycles, 2);
    }

    #[test]
    fn blacklisted_event_rolls_the_batch_back() {
        let mut t = tracker();
        t.observe(&halt_exit(100), None);
        t.observe(&host(200, "local_timer_entry", "vector=236"), None);
        assert_eq!(t.observe(&halt_exit(400), None), BatchAction::Rollback);
        // The next, clean batch still commits.
        assert_eq!(t.observe(&halt_exit(700), None), BatchAction::Commit);
        let series = t.finish();
        assert_eq!(series[0].intervals, vec![Interval {
            start: 400,
            end: 700,
            cycles: 300
        }]);
    }

    #[test]
    fn kick_trigger_disables_halt_triggers() {
        let mut t = tracker();
        let note = kick_note();
        assert_eq!(
            t.observe(
                &host(100, KVM_EXIT, "reason EPT_MISCONFIG rip 0 info 0 0"),
                Some(&note)
            ),
            BatchAction::Commit
        );
        // A halt exit is no longer a trigger.
        assert_eq!(t.observe(&halt_exit(200), None), BatchAction::None);
        assert_eq!(
            t.observe(
                &host(500, KVM_EXIT, "reason EPT_MISCONFIG rip 0 info 0 0"),
                Some(&note)
            ),
            BatchAction::Commit
        );
        let series = t.finish();
        assert_eq!(series[0].intervals[0].cycles, 400);
    }

    #[test]
    fn close_seals_the_tail_span() {
        let mut t = tracker();
        t.observe(&halt_exit(100), None);
        t.observe(&host(200, "sys_read", "fd: 11"), None);
        assert_eq!(t.close(), BatchAction::Commit);

        let mut t = tracker();
        t.observe(&halt_exit(100), None);
        t.observe(&host(200, "local_timer_entry", "vector=236"), None);
        assert_eq!(t.close(), BatchAction::Rollback);
    }

    #[test]
    fn first_trigger_emits_no_batch_interval() {
        let mut t = tracker();
        t.observe(&halt_exit(100), None);
        let series = t.finish();
        assert!(series[0].intervals.is_empty());
        assert!(series[1].intervals.is_empty());
    }
}
