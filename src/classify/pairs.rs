//! The simple start/end pair classifiers.
//!
//! Each one encodes a two-state machine over a pair of event kinds:
//! remember the start, emit an interval at the matching end. An end with
//! no pending start is ignored; a repeated start overwrites the pending
//! one.

use regex::Regex;

use super::interval::{Interval, IntervalSet, LabeledSeries};
use super::Classifier;
use crate::event::{Event, Source};

/// netperf transaction on the guest side: `sys_sendto` entry to
/// `sys_recvfrom` return by a netperf process.
pub struct SendRecv {
    process: Regex,
    last_send: Option<i64>,
    set: IntervalSet,
}

impl SendRecv {
    pub fn new(process: Regex) -> Self {
        Self {
            process,
            last_send: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Classifier for SendRecv {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Guest || !self.process.is_match(&event.process) {
            return;
        }
        if event.name == "sys_sendto" {
            self.last_send = Some(event.timestamp);
        } else if event.name == "sys_recvfrom" {
            if let Some(start) = self.last_send.take() {
                self.set.push(Interval {
                    start,
                    end: event.timestamp,
                    cycles: event.timestamp - start,
                });
            }
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_send = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("guest_sendrecv_netperf")]
    }
}

/// Scheduler overhead on the host: time from a `sched_switch` to whatever
/// event follows it.
pub struct SchedOverhead {
    last_switch: Option<i64>,
    set: IntervalSet,
}

impl SchedOverhead {
    pub fn new() -> Self {
        Self {
            last_switch: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Default for SchedOverhead {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for SchedOverhead {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host {
            return;
        }
        if event.name == "sched_switch" {
            self.last_switch = Some(event.timestamp);
        } else if let Some(start) = self.last_switch.take() {
            self.set.push(Interval {
                start,
                end: event.timestamp,
                cycles: event.timestamp - start,
            });
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_switch = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("host_sched_overhead")]
    }
}

/// Time the netserver process spends on a host CPU: `sched_switch` that
/// schedules it in, to the `sched_switch` that schedules it out.
pub struct SchedNetserver {
    sched_in: Regex,
    sched_out: Regex,
    last_in: Option<i64>,
    set: IntervalSet,
}

impl SchedNetserver {
    pub fn new(comm: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            sched_in: Regex::new(&format!("next_comm={}", regex::escape(comm)))?,
            sched_out: Regex::new(&format!("prev_comm={}", regex::escape(comm)))?,
            last_in: None,
            set: IntervalSet::cycles(),
        })
    }
}

impl Classifier for SchedNetserver {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host || event.name != "sched_switch" {
            return;
        }
        if self.sched_in.is_match(&event.info) {
            self.last_in = Some(event.timestamp);
        } else if self.sched_out.is_match(&event.info) {
            if let Some(start) = self.last_in.take() {
                self.set.push(Interval {
                    start,
                    end: event.timestamp,
                    cycles: event.timestamp - start,
                });
            }
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_in = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("host_netserver")]
    }
}

/// Guest transmit path: `net_dev_start_xmit` to `net_dev_xmit`.
pub struct NetDevXmit {
    last_start: Option<i64>,
    set: IntervalSet,
}

impl NetDevXmit {
    pub fn new() -> Self {
        Self {
            last_start: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Default for NetDevXmit {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for NetDevXmit {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Guest {
            return;
        }
        if event.name == "net_dev_start_xmit" {
            self.last_start = Some(event.timestamp);
        } else if event.name == "net_dev_xmit" {
            if let Some(start) = self.last_start.take() {
                self.set.push(Interval {
                    start,
                    end: event.timestamp,
                    cycles: event.timestamp - start,
                });
            }
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_start = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("guest_xmit")]
    }
}

/// Host `sys_writev` syscall duration (entry to return).
pub struct SysWritev {
    last_entry: Option<i64>,
    set: IntervalSet,
}

impl SysWritev {
    pub fn new() -> Self {
        Self {
            last_entry: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Default for SysWritev {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for SysWritev {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host || event.name != "sys_writev" {
            return;
        }
        if !event.is_syscall_return() {
            self.last_entry = Some(event.timestamp);
        } else if let Some(start) = self.last_entry.take() {
            self.set.push(Interval {
                start,
                end: event.timestamp,
                cycles: event.timestamp - start,
            });
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_entry = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("host_writev")]
    }
}

/// Host `sys_read` on the tap device fd (entry to return). Reads on other
/// fds clear the pending entry so their returns cannot be mispaired.
pub struct SysRead {
    fd_marker: String,
    last_entry: Option<i64>,
    set: IntervalSet,
}

impl SysRead {
    pub fn new(fd_marker: impl Into<String>) -> Self {
        Self {
            fd_marker: fd_marker.into(),
            last_entry: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Classifier for SysRead {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host || event.name != "sys_read" {
            return;
        }
        if !event.is_syscall_return() {
            if event.info.contains(&self.fd_marker) {
                self.last_entry = Some(event.timestamp);
            } else {
                self.last_entry = None;
            }
        } else if let Some(start) = self.last_entry.take() {
            self.set.push(Interval {
                start,
                end: event.timestamp,
                cycles: event.timestamp - start,
            });
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_entry = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("host_read_packets")]
    }
}

/// Gap between consecutive runs of one syscall on a pinned CPU: the
/// return of one call to the entry of the next. Any other event on that
/// CPU breaks the chain, so only back-to-back calls are measured.
pub struct SyscallDelta {
    label: &'static str,
    syscall: &'static str,
    fd_marker: String,
    cpu: i64,
    last_entry: Option<i64>,
    last_return: Option<i64>,
    set: IntervalSet,
}

impl SyscallDelta {
    pub fn read(fd_marker: impl Into<String>, cpu: i64) -> Self {
        Self::new("host_delta_read", "sys_read", fd_marker, cpu)
    }

    pub fn writev(fd_marker: impl Into<String>, cpu: i64) -> Self {
        Self::new("host_delta_writev", "sys_writev", fd_marker, cpu)
    }

    fn new(
        label: &'static str,
        syscall: &'static str,
        fd_marker: impl Into<String>,
        cpu: i64,
    ) -> Self {
        Self {
            label,
            syscall,
            fd_marker: fd_marker.into(),
            cpu,
            last_entry: None,
            last_return: None,
            set: IntervalSet::cycles(),
        }
    }

    fn clear(&mut self) {
        self.last_entry = None;
        self.last_return = None;
    }
}

impl Classifier for SyscallDelta {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host {
            return;
        }
        match event.cpu.parse::<i64>() {
            Ok(cpu) if cpu == self.cpu => {}
            _ => return,
        }

        if event.name != self.syscall {
            self.clear();
            return;
        }
        if event.is_syscall_return() {
            if self.last_entry.is_some() {
                self.last_return = Some(event.timestamp);
            }
        } else if event.info.contains(&self.fd_marker) {
            if let (Some(_), Some(prev_return)) = (self.last_entry, self.last_return) {
                self.set.push(Interval {
                    start: prev_return,
                    end: event.timestamp,
                    cycles: event.timestamp - prev_return,
                });
            }
            self.last_entry = Some(event.timestamp);
            self.last_return = None;
        } else {
            self.clear();
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.clear();
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series(self.label)]
    }
}

/// Guest network interrupt handler: `irq_handler_entry` for a matching
/// device to `irq_handler_exit`.
pub struct IrqHandler {
    devices: Vec<String>,
    last_entry: Option<i64>,
    set: IntervalSet,
}

impl IrqHandler {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            last_entry: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Classifier for IrqHandler {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Guest {
            return;
        }
        if event.name == "irq_handler_entry" {
            if self.devices.iter().any(|d| event.info.contains(d.as_str())) {
                self.last_entry = Some(event.timestamp);
            }
        } else if event.name == "irq_handler_exit" {
            if let Some(start) = self.last_entry.take() {
                self.set.push(Interval {
                    start,
                    end: event.timestamp,
                    cycles: event.timestamp - start,
                });
            }
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_entry = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("guest_interrupt_handler")]
    }
}

/// Host `sys_ioctl` calls that inject an interrupt into the guest,
/// matched by command constant (entry to return).
pub struct IoctlInterrupt {
    commands: Vec<String>,
    last_entry: Option<i64>,
    set: IntervalSet,
}

impl IoctlInterrupt {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            last_entry: None,
            set: IntervalSet::cycles(),
        }
    }
}

impl Classifier for IoctlInterrupt {
    fn on_event(&mut self, event: &Event, _note: Option<&Event>) {
        if event.source != Source::Host || event.name != "sys_ioctl" {
            return;
        }
        let is_inject = !event.is_syscall_return()
            && self.commands.iter().any(|c| event.info.contains(c.as_str()));
        if is_inject {
            self.last_entry = Some(event.timestamp);
        } else if let Some(start) = self.last_entry.take() {
            self.set.push(Interval {
                start,
                end: event.timestamp,
                cycles: event.timestamp - start,
            });
        }
    }

    fn commit(&mut self) {
        self.set.commit();
    }

    fn rollback(&mut self) {
        self.set.rollback();
        self.last_entry = None;
    }

    fn finish(self: Box<Self>) -> Vec<LabeledSeries> {
        vec![self.set.into_series("host_ioctl_interrupt")]
    }
}
