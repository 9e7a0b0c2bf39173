//! The normalized representation of one trace line.
//!
//! An [`Event`] is created once by the parser and never mutated afterwards.
//! The `reason` field is derived at construction time for the event kinds
//! that carry one (VM exits, MMIO accesses, MSR accesses) and translated
//! through a device-register name table when a mapping is known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// VM-exit trap event.
pub const KVM_EXIT: &str = "kvm_exit";
/// VM re-entry event.
pub const KVM_ENTRY: &str = "kvm_entry";
/// Memory-mapped I/O access observed by the hypervisor.
pub const KVM_MMIO: &str = "kvm_mmio";
/// Model-specific-register access observed by the hypervisor.
pub const KVM_MSR: &str = "kvm_msr";
/// Clock-sync event reporting the guest TSC offset.
pub const KVM_WRITE_TSC_OFFSET: &str = "kvm_write_tsc_offset";
/// Benchmark begin/end marker injected through the trace_marker file.
pub const TRACING_MARK_WRITE: &str = "tracing_mark_write";

/// Which capture the event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Host,
    Guest,
}

impl Source {
    /// One-character tag used in the merged-trace dialect.
    pub fn tag(self) -> char {
        match self {
            Source::Host => 'h',
            Source::Guest => 'g',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'h' => Some(Source::Host),
            'g' => Some(Source::Guest),
            _ => None,
        }
    }
}

/// One parsed trace record.
///
/// `timestamp` is in cycles of the capturing clock at parse time; after
/// clock synchronization every event in a merged timeline is on the host
/// clock and timestamps are comparable across sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub source: Source,
    pub process: String,
    /// CPU column exactly as written in the trace, e.g. `"002"`.
    pub cpu: String,
    pub flags: String,
    pub timestamp: i64,
    pub name: String,
    /// Unparsed tail of the line.
    pub info: String,
    /// Derived classification string; empty for event kinds without one.
    pub reason: String,
}

impl Event {
    pub fn new(
        source: Source,
        process: String,
        cpu: String,
        flags: String,
        timestamp: i64,
        name: String,
        info: String,
        reasons: &ReasonTable,
    ) -> Self {
        let reason = derive_reason(&name, &info, reasons);
        Self {
            source,
            process,
            cpu,
            flags,
            timestamp,
            name,
            info,
            reason,
        }
    }

    /// True for syscall events that record the return side of the call.
    pub fn is_syscall_return(&self) -> bool {
        self.info.contains("->")
    }
}

/// Extract the event-kind-specific reason string.
///
/// Exits take the second whitespace token of the info tail; MMIO accesses
/// compose `"<op> <last-4-hex-of-gpa>"`; MSR accesses compose
/// `"<op> <addr>"`. Anything the table knows is translated to the
/// human-readable register name, otherwise the raw composite stands.
fn derive_reason(name: &str, info: &str, reasons: &ReasonTable) -> String {
    let tokens: Vec<&str> = info.split_whitespace().collect();
    let raw = match name {
        KVM_EXIT => match tokens.get(1) {
            Some(tok) => (*tok).to_string(),
            None => return String::new(),
        },
        KVM_MMIO => match (tokens.get(1), tokens.get(5)) {
            (Some(op), Some(addr)) => {
                let tail_start = addr.len().saturating_sub(4);
                let tail = addr.get(tail_start..).unwrap_or(addr);
                format!("{} {}", op, tail)
            }
            _ => return String::new(),
        },
        KVM_MSR => match (tokens.first(), tokens.get(1)) {
            (Some(op), Some(addr)) => format!("{} {}", op, addr),
            _ => return String::new(),
        },
        _ => return String::new(),
    };
    reasons.translate(&raw)
}

/// Maps raw MMIO/MSR reason composites to device-register names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonTable {
    names: BTreeMap<String, String>,
}

impl ReasonTable {
    /// Table for the e1000 register window and the local-APIC MSRs the
    /// measurement rig touches.
    pub fn builtin() -> Self {
        let names = [
            ("msr_write 80b", "MSR EOI"),
            ("msr_write 838", "MSR ICR"),
            ("msr_read 819", "MSR TMR"),
            ("read 0008", "E1000 STATUS"),
            ("write 3818", "E1000 TDT"),
            ("write 2818", "E1000 RDT"),
            ("write 0034", "E1000 KICK"),
            ("write 00d0", "E1000 IMS"),
            ("write 00d8", "E1000 IMC"),
            ("read 00c0", "E1000 ICR"),
            ("write 00c4", "E1000 ITR"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { names }
    }

    pub fn empty() -> Self {
        Self {
            names: BTreeMap::new(),
        }
    }

    /// Add or override a mapping.
    pub fn insert(&mut self, raw: impl Into<String>, name: impl Into<String>) {
        self.names.insert(raw.into(), name.into());
    }

    /// Translate a raw composite, falling back to it unchanged.
    pub fn translate(&self, raw: &str) -> String {
        match self.names.get(raw) {
            Some(name) => name.clone(),
            None => raw.to_string(),
        }
    }
}

impl Default for ReasonTable {
    fn default() -> Self {
        Self::builtin()
    }
}
