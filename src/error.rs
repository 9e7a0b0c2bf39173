//! Error taxonomy for the analysis pipeline.
//!
//! Parsing and synchronization failures are fatal and surfaced immediately;
//! classification-level anomalies (unmatched end events, broken chains,
//! invalidated batches) are absorbed inside the classifiers and never appear
//! here.

use thiserror::Error;

/// Fatal pipeline errors.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The host trace carries no `kvm_write_tsc_offset` event; host and
    /// guest timestamps cannot be compared.
    #[error("no clock-sync event (kvm_write_tsc_offset) in the host trace")]
    MissingSyncEvent,

    /// A clock-sync event was found but its offset field did not parse.
    #[error("clock-sync event carries an unreadable offset: {0:?}")]
    BadSyncOffset(String),

    /// The merged timeline did not contain exactly two benchmark markers.
    #[error("expected exactly two tracing_mark_write markers, found {found}")]
    WindowMarkers { found: usize },

    /// The settle margins left no events between the markers.
    #[error("settle margins trimmed the benchmark window to empty")]
    EmptyWindow,

    /// A single trace line could not be parsed (strict mode only; the
    /// lenient parser skips and counts these instead).
    #[error("line {line}: {cause}")]
    MalformedLine { line: usize, cause: LineError },

    /// The CPU frequency source was unusable.
    #[error("cannot read cpu frequency: {0}")]
    BadCpuInfo(String),

    /// The analysis configuration was rejected during validation.
    #[error("invalid configuration: {0}")]
    BadConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why one trace line failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line shorter than the fixed-width process column")]
    Truncated,

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),

    #[error("unknown source tag in flags {0:?}")]
    BadSourceTag(String),
}
