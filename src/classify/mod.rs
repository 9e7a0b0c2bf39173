//! Stateful event classifiers and the single-pass engine that drives them.
//!
//! A classifier consumes one event at a time and decides whether to update
//! its private state, emit a completed interval into its pending buffer,
//! or ignore the event. Classifiers are independent of each other; the
//! engine fans every window event out to all of them in one traversal and
//! lets the batch tracker tell them when to commit or discard what they
//! have accumulated.

mod batch;
mod exits;
mod interval;
mod pairs;
mod recv;

pub use batch::{BatchAction, BatchTracker};
pub use exits::{ExitTimes, HwExitTimes, HW_ENTRY_LABEL, HW_EXIT_LABEL};
pub use interval::{Interval, IntervalSet, LabeledSeries, MetricUnit};
pub use pairs::{
    IoctlInterrupt, IrqHandler, NetDevXmit, SchedNetserver, SchedOverhead, SendRecv, SysRead,
    SysWritev, SyscallDelta,
};
pub use recv::RecvChain;

use crate::event::{Event, Source, KVM_ENTRY, KVM_EXIT, KVM_MMIO, KVM_MSR};

/// A stateful consumer of the merged, windowed event stream.
///
/// Uniform edge-case behavior across implementations: an end event with no
/// pending start is ignored, and a new start overwrites a pending one
/// (last-start-wins) unless the classifier explicitly models a chain.
pub trait Classifier {
    /// Consume the next event. `note` carries the MMIO/MSR event that
    /// annotates a VM exit, when one exists.
    fn on_event(&mut self, event: &Event, note: Option<&Event>);

    /// Promote pending intervals into the permanent result list.
    fn commit(&mut self);

    /// Discard pending intervals and reset in-flight state, as if the
    /// events since the last commit point had never been seen.
    fn rollback(&mut self);

    /// Seal the classifier into its labeled series.
    fn finish(self: Box<Self>) -> Vec<LabeledSeries>;
}

/// Exit-annotation side-table: for each event index, the index of the
/// MMIO/MSR event that explains it.
///
/// An MMIO or MSR access annotates the most recent VM exit, but only until
/// the VM re-enters; when several accesses occur in one exit span the last
/// one wins.
pub fn annotate_exits(events: &[Event]) -> Vec<Option<u32>> {
    let mut notes = vec![None; events.len()];
    let mut pending_exit: Option<usize> = None;
    for (i, event) in events.iter().enumerate() {
        match event.name.as_str() {
            KVM_EXIT => pending_exit = Some(i),
            KVM_ENTRY => pending_exit = None,
            KVM_MMIO | KVM_MSR => {
                if let Some(exit) = pending_exit {
                    notes[exit] = Some(i as u32);
                }
            }
            _ => {}
        }
    }
    notes
}

/// Which events reach the classifiers.
///
/// Guest events always pass; host events can be restricted to the CPU the
/// vCPU was pinned to, which drops unrelated host activity from every
/// classifier at once.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub host_cpu: Option<String>,
}

impl EventFilter {
    pub fn accepts(&self, event: &Event) -> bool {
        match (&event.source, &self.host_cpu) {
            (Source::Guest, _) => true,
            (Source::Host, Some(cpu)) => event.cpu == *cpu,
            (Source::Host, None) => true,
        }
    }
}

/// Single-pass fan-out over a set of classifiers.
pub struct Engine {
    classifiers: Vec<Box<dyn Classifier>>,
    tracker: Option<BatchTracker>,
    filter: EventFilter,
}

impl Engine {
    pub fn new(filter: EventFilter) -> Self {
        Self {
            classifiers: Vec::new(),
            tracker: None,
            filter,
        }
    }

    pub fn register(&mut self, classifier: Box<dyn Classifier>) {
        self.classifiers.push(classifier);
    }

    /// Engage batch segmentation; without a tracker the whole window is
    /// committed as one span at the end of the pass.
    pub fn set_tracker(&mut self, tracker: BatchTracker) {
        self.tracker = Some(tracker);
    }

    /// Drive every classifier over the window and collect their series.
    ///
    /// The annotation side-table is computed over the full window (before
    /// filtering) so notes survive even when the annotating event itself
    /// is filtered away from the classifiers.
    pub fn run(mut self, events: &[Event]) -> Vec<LabeledSeries> {
        let notes = annotate_exits(events);

        for (i, event) in events.iter().enumerate() {
            if !self.filter.accepts(event) {
                continue;
            }
            let note = notes[i].map(|j| &events[j as usize]);
            for classifier in &mut self.classifiers {
                classifier.on_event(event, note);
            }
            if let Some(tracker) = &mut self.tracker {
                match tracker.observe(event, note) {
                    BatchAction::None => {}
                    BatchAction::Commit => {
                        for classifier in &mut self.classifiers {
                            classifier.commit();
                        }
                    }
                    BatchAction::Rollback => {
                        for classifier in &mut self.classifiers {
                            classifier.rollback();
                        }
                    }
                }
            }
        }

        // Close the final span: clean spans commit, dirty ones roll back.
        let final_action = match &mut self.tracker {
            Some(tracker) => tracker.close(),
            None => BatchAction::Commit,
        };
        for classifier in &mut self.classifiers {
            match final_action {
                BatchAction::Commit | BatchAction::None => classifier.commit(),
                BatchAction::Rollback => classifier.rollback(),
            }
        }

        let mut series: Vec<LabeledSeries> = self
            .classifiers
            .into_iter()
            .flat_map(|c| c.finish())
            .collect();
        if let Some(tracker) = self.tracker {
            series.extend(tracker.finish());
        }
        series
    }
}
