//! VM-exit attribution classifiers.
//!
//! Two structurally different views of the same trap: [`ExitTimes`] pairs
//! each `kvm_exit` with the following `kvm_entry` and attributes the whole
//! span to the exit reason (refined by the annotating MMIO/MSR access when
//! there is one); [`HwExitTimes`] brackets the trap with explicit software
//! markers emitted just before and just after it, measuring the
//! instructions executed around the hardware transition independently of
//! the trap's own duration.

use std::collections::BTreeMap;

use super::interval::{Interval, IntervalSet, LabeledSeries};
use super::Classifier;
use crate::event::{Event, KVM_ENTRY, KVM_EXIT};

/// Guest-side marker fired immediately before a forced VM exit.
pub const NET_EXIT_BEFORE: &str = "net_exit_before";
/// Guest-side marker fired immediately after the VM re-enters.
pub const NET_EXIT_AFTER: &str = "net_exit_after";

/// Aggregate label for the pre-trap span of every bracketed exit.
pub const HW_EXIT_LABEL: &str = "HW_exit";
/// Aggregate label for the post-trap span of every bracketed exit.
pub const HW_ENTRY_LABEL: &str = "HW_entry";

fn reason_label(prefix: &str, reason: &str, note_reason: Option<&str>) -> String {
    match note_reason {
        Some(note) => format!("{}{} {}", prefix, reason, note),
        None => format!("{}{}", prefix, reason),
    }
}

struct PendingExit {
    start: i64,
    reason: String,
    note_reason: Option<String>,
}

/// Direct exit→entry pairing, one label per (reason, note) combination.
pub struct ExitTimes {
    pending: Option<PendingExit>,
    sets: BTreeMap<String, IntervalSet>,
}

impl ExitTimes {
    pub fn new() -> Self {
        Self {
            pending: None,
            sets: BTreeMap::new(),
        }
    }

    fn push(&mut self, label: String, interval: Interval) {
        self.sets
            .entry(label)
            .or_insert_with(IntervalSet::cycles)
            .push(interval);
    }
}

impl Default for ExitTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for ExitTimes {
    fn on_event(&mut self, event: &Event, note: Option<&Event>) {
        match event.name.as_str() {
            KVM_EXIT => {
                self.pending = Some(PendingExit {
                    start: event.timestamp,
                    reason: event.reason.clone(),
                    note_reason: note.map(|n| n.reason.clone()),
                });
            }
            KVM_ENTRY => {
                if let Some(exit) = self.pending.take() {
                    let label =
                        reason_label("", &exit.reason, exit.note_reason.as_deref());
                    self.push(
                        label,
                        Interval {
                            start: exit.start,
                            end: event.timestamp,
                            cycles: event.timestamp - exit.start,
                        },
                    );
                }
            }
            _ => {}
        }
    }

    fn commit(&mut self) {
        for set in self.sets.values_mut() {
            set.commit();
        }
    }

    fn rollback(&mut self) {
        for set in self.sets.values_mut() {
            set.rollback();
        }
        self.pending = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        self.sets
            .into_iter()
            .map(|(label, set)| set.into_series(label))
            .collect()
    }
}

/// Pre/post bracketing of the hardware trap itself.
///
/// `net_exit_before → kvm_exit` measures the software run-up to the trap;
/// `kvm_entry → net_exit_after` measures the run-down after it. Both are
/// recorded under the aggregate labels and under a per-reason label.
pub struct HwExitTimes {
    last_before: Option<i64>,
    last_exit: Option<(String, Option<String>)>,
    last_entry: Option<i64>,
    sets: BTreeMap<String, IntervalSet>,
}

impl HwExitTimes {
    pub fn new() -> Self {
        Self {
            last_before: None,
            last_exit: None,
            last_entry: None,
            sets: BTreeMap::new(),
        }
    }

    fn push(&mut self, label: String, interval: Interval) {
        self.sets
            .entry(label)
            .or_insert_with(IntervalSet::cycles)
            .push(interval);
    }
}

impl Default for HwExitTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for HwExitTimes {
    fn on_event(&mut self, event: &Event, note: Option<&Event>) {
        match event.name.as_str() {
            NET_EXIT_BEFORE => {
                self.last_before = Some(event.timestamp);
            }
            KVM_EXIT => {
                let note_reason = note.map(|n| n.reason.clone());
                if let Some(before) = self.last_before.take() {
                    let interval = Interval {
                        start: before,
                        end: event.timestamp,
                        cycles: event.timestamp - before,
                    };
                    let label =
                        reason_label("HW-exit-", &event.reason, note_reason.as_deref());
                    self.push(label, interval);
                    self.push(HW_EXIT_LABEL.to_string(), interval);
                }
                self.last_exit = Some((event.reason.clone(), note_reason));
            }
            KVM_ENTRY => {
                self.last_entry = Some(event.timestamp);
            }
            NET_EXIT_AFTER => {
                if let (Some(entry), Some((reason, note_reason))) =
                    (self.last_entry.take(), self.last_exit.take())
                {
                    let interval = Interval {
                        start: entry,
                        end: event.timestamp,
                        cycles: event.timestamp - entry,
                    };
                    let label = reason_label("HW-enter-", &reason, note_reason.as_deref());
                    self.push(label, interval);
                    self.push(HW_ENTRY_LABEL.to_string(), interval);
                }
                self.last_entry = None;
                self.last_exit = None;
            }
            _ => {}
        }
    }

    fn commit(&mut self) {
        for set in self.sets.values_mut() {
            set.commit();
        }
    }

    fn rollback(&mut self) {
        for set in self.sets.values_mut() {
            set.rollback();
        }
        self.last_before = None;
        self.last_exit = None;
        self.last_entry = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        self.sets
            .into_iter()
            .map(|(label, set)| set.into_series(label))
            .collect()
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

    fn guest(timestamp: i64, name: &str) -> Event {
        Event::new(
            Source::Guest,
            "netperf-2156".into(),
            "001".into(),
            "....".into(),
            timestamp,
            name.into(),
            String::new(),
            &ReasonTable::builtin(),
        )
    }

    fn collect(mut classifier: Box<dyn Classifier>) -> BTreeMap<String, Vec<Interval>> {
        classifier.commit();
        classifier
            .finish()
            .into_iter()
            .map(|s| (s.label, s.intervals))
            .collect()
    }

    #[test]
    fn exit_attributed_to_reason() {
        let mut c: Box<dyn Classifier> = Box::new(ExitTimes::new());
        c.on_event(&host(10, KVM_EXIT, "reason HLT rip 0 info 0 0"), None);
        c.on_event(&host(40, KVM_ENTRY, "vcpu 0"), None);
        let results = collect(c);
        assert_eq!(results["HLT"], vec![Interval {
            start: 10,
            end: 40,
            cycles: 30
        }]);
    }

    #[test]
    fn exit_label_appends_note_reason() {
        let mmio = host(12, KVM_MMIO, "mmio write len 4 gpa 0xfebc0034 val 0x1");
        let mut c: Box<dyn Classifier> = Box::new(ExitTimes::new());
        c.on_event(
            &host(10, KVM_EXIT, "reason EPT_MISCONFIG rip 0 info 0 0"),
            Some(&mmio),
        );
        c.on_event(&host(20, KVM_ENTRY, "vcpu 0"), None);
        let results = collect(c);
        assert_eq!(results["EPT_MISCONFIG E1000 KICK"], vec![Interval {
            start: 10,
            end: 20,
            cycles: 10
        }]);
    }

    #[test]
    fn entry_without_exit_is_ignored() {
        let mut c: Box<dyn Classifier> = Box::new(ExitTimes::new());
        c.on_event(&host(40, KVM_ENTRY, "vcpu 0"), None);
        assert!(collect(c).is_empty());
    }

    #[test]
    fn hw_exit_brackets_the_trap() {
        let mut c: Box<dyn Classifier> = Box::new(HwExitTimes::new());
        c.on_event(&guest(100, NET_EXIT_BEFORE), None);
        c.on_event(&host(130, KVM_EXIT, "reason EPT_MISCONFIG rip 0 info 0 0"), None);
        c.on_event(&host(300, KVM_ENTRY, "vcpu 0"), None);
        c.on_event(&guest(340, NET_EXIT_AFTER), None);
        let results = collect(c);
        assert_eq!(results[HW_EXIT_LABEL][0].cycles, 30);
        assert_eq!(results[HW_ENTRY_LABEL][0].cycles, 40);
        assert_eq!(results["HW-exit-EPT_MISCONFIG"][0].cycles, 30);
        assert_eq!(results["HW-enter-EPT_MISCONFIG"][0].cycles, 40);
    }

    #[test]
    fn unbracketed_exit_measures_nothing() {
        let mut c: Box<dyn Classifier> = Box::new(HwExitTimes::new());
        c.on_event(&host(130, KVM_EXIT, "reason HLT rip 0 info 0 0"), None);
        c.on_event(&host(300, KVM_ENTRY, "vcpu 0"), None);
        let results = collect(c);
        assert!(results.is_empty());
    }
}
