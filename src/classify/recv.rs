//! Multi-hop receive-path classifier.
//!
//! The guest receive function is instrumented with a four-event chain:
//! `net_dev_recv_start → napi_receive_start → napi_receive_end →
//! net_dev_recv_end`. The measured duration is the telescoping sum of the
//! chain, which excludes the inner napi hop. A chain broken by an
//! out-of-order event (common during warm-up) is dropped silently.

use super::interval::{Interval, IntervalSet, LabeledSeries};
use super::Classifier;
use crate::event::{Event, Source};

const CHAIN: [&str; 4] = [
    "net_dev_recv_start",
    "napi_receive_start",
    "napi_receive_end",
    "net_dev_recv_end",
];

pub struct RecvChain {
    stamps: Vec<i64>,
    set: IntervalSet,
}

impl RecvChain {
    pub fn new() -> Self {
        Self {
            stamps: Vec::with_capacity(CHAIN.len()),
            set: IntervalSet::cycles(),
        }
    }
}

impl Default for RecvChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for RecvChain {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Guest {
            return;
        }
        let Some(position) = CHAIN.iter().position(|n| *n == event.name) else {
            // Unrelated events may interleave with the chain.
            return;
        };

        if position == 0 {
            // A new chain start always resets, even mid-chain.
            self.stamps.clear();
            self.stamps.push(event.timestamp);
        } else if position == self.stamps.len() {
            self.stamps.push(event.timestamp);
            if self.stamps.len() == CHAIN.len() {
                if let Some(interval) = Interval::series(&self.stamps) {
                    self.set.push(interval);
                }
                self.stamps.clear();
            }
        } else {
            // Out of order: drop the partial chain.
            self.stamps.clear();
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.stamps.clear();
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("guest_recv_func")]
    }
}
