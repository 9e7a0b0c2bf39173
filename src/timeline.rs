//! Host/guest clock synchronization and stream merging.
//!
//! The hypervisor programs a fixed offset into the guest TSC and reports it
//! through a `kvm_write_tsc_offset` trace event on the host side. The
//! offset field is logged as an unsigned 64-bit integer but is really a
//! signed delta, so it must be reinterpreted as two's-complement before
//! use. Subtracting it from every guest timestamp puts both streams on the
//! host clock; a stable sort then yields one totally ordered timeline.

use std::io::{self, BufRead, Write};

use tracing::info;

use crate::error::AnalysisError;
use crate::event::{Event, ReasonTable, Source, KVM_WRITE_TSC_OFFSET};
use crate::parse::{parse_merged_line, TraceStream, PROCESS_WIDTH};

/// Host and guest events on one clock, sorted by timestamp.
#[derive(Debug, Clone)]
pub struct MergedTimeline {
    pub events: Vec<Event>,
    /// The signed TSC offset that was subtracted from guest timestamps.
    pub tsc_offset: i64,
}

impl MergedTimeline {
    /// Align the guest stream to the host clock and merge the two streams.
    ///
    /// Fails with [`AnalysisError::MissingSyncEvent`] when the host stream
    /// carries no clock-sync event; without it the streams cannot be
    /// compared. When several sync events exist the last one wins.
    pub fn synchronize(host: TraceStream, guest: TraceStream) -> Result<Self, AnalysisError> {
        debug_assert_eq!(host.source, Source::Host);
        debug_assert_eq!(guest.source, Source::Guest);

        let tsc_offset = find_tsc_offset(&host)?;
        info!(tsc_offset, "found clock-sync event");

        let mut events = guest.events;
        for event in &mut events {
            event.timestamp -= tsc_offset;
        }
        events.extend(host.events);
        // Stable: equal timestamps keep guest-before-host order.
        events.sort_by_key(|e| e.timestamp);

        Ok(Self { events, tsc_offset })
    }

    /// Write the timeline in the merged-trace dialect, which prefixes the
    /// flags column with the source tag so a re-parse recovers it.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        for event in &self.events {
            writeln!(
                w,
                "{:>width$} [{}] {}{} {}: {}: {}",
                event.process,
                event.cpu,
                event.source.tag(),
                event.flags,
                event.timestamp,
                event.name,
                event.info,
                width = PROCESS_WIDTH
            )?;
        }
        Ok(())
    }

    /// Re-read a timeline previously written with [`MergedTimeline::write_to`].
    ///
    /// The offset is already applied in the written timestamps, so the
    /// reconstructed timeline reports an offset of zero.
    pub fn read_from<R: BufRead>(
        reader: R,
        reasons: &ReasonTable,
    ) -> Result<Self, AnalysisError> {
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            match parse_merged_line(&line, reasons) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(cause) => {
                    return Err(AnalysisError::MalformedLine {
                        line: idx + 1,
                        cause,
                    });
                }
            }
        }
        Ok(Self {
            events,
            tsc_offset: 0,
        })
    }
}

/// Locate the clock-sync event in the host stream and decode its offset.
fn find_tsc_offset(host: &TraceStream) -> Result<i64, AnalysisError> {
    let mut offset = None;
    for event in &host.events {
        if event.name == KVM_WRITE_TSC_OFFSET {
            let raw = event
                .info
                .rsplit('=')
                .next()
                .map(str::trim)
                .unwrap_or_default();
            let value = raw
                .parse::<u64>()
                .map_err(|_| AnalysisError::BadSyncOffset(raw.to_string()))?;
            offset = Some(value as i64);
        }
    }
    offset.ok_or(AnalysisError::MissingSyncEvent)
}
