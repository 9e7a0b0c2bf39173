//! One-shot analysis pipeline.
//!
//! parse → synchronize → merge → window → classify → aggregate, as a pure
//! function over the two trace texts, the configuration, and the clock.
//! Everything runs single-threaded in one pass; the only latitude a
//! caller has is to parse the two input files independently before
//! handing them over.

use std::io::BufRead;
use std::ops::Range;

use tracing::debug;

use crate::classify::{
    BatchTracker, Engine, EventFilter, ExitTimes, HwExitTimes, IoctlInterrupt, IrqHandler,
    NetDevXmit, RecvChain, SchedNetserver, SchedOverhead, SendRecv, SysRead, SysWritev,
    SyscallDelta,
};
use crate::clock::ClockConfig;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::event::Source;
use crate::parse::TraceStream;
use crate::report::Report;
use crate::timeline::MergedTimeline;
use crate::window;

/// Everything one pass produces.
#[derive(Debug)]
pub struct Analysis {
    pub report: Report,
    /// The synchronized timeline, kept for merged-trace output.
    pub timeline: MergedTimeline,
    /// Index range of the benchmark window within the timeline.
    pub window: Range<usize>,
    /// Malformed lines skipped across both input files.
    pub malformed_lines: usize,
}

/// Run the whole pipeline over two raw trace texts.
pub fn analyze<H: BufRead, G: BufRead>(
    host: H,
    guest: G,
    config: &AnalysisConfig,
    clock: &ClockConfig,
) -> Result<Analysis, AnalysisError> {
    config.validate()?;
    let reasons = config.reason_table();

    let host = TraceStream::parse(host, Source::Host, &reasons)?;
    let guest = TraceStream::parse(guest, Source::Guest, &reasons)?;
    let malformed_lines = host.malformed + guest.malformed;
    debug!(
        host_events = host.events.len(),
        guest_events = guest.events.len(),
        malformed_lines,
        "parsed trace files"
    );

    let timeline = MergedTimeline::synchronize(host, guest)?;
    let window = window::extract_range(&timeline, &config.margins, clock)?;
    debug!(
        window_events = window.len(),
        tsc_offset = timeline.tsc_offset,
        "extracted benchmark window"
    );

    let engine = build_engine(config)?;
    let series = engine.run(&timeline.events[window.clone()]);
    let report = Report::build(series, clock, config.selector, &config.composites);

    Ok(Analysis {
        report,
        timeline,
        window,
        malformed_lines,
    })
}

/// Assemble the full classifier set from a configuration.
pub fn build_engine(config: &AnalysisConfig) -> Result<Engine, AnalysisError> {
    let mut engine = Engine::new(EventFilter {
        host_cpu: config.host_cpu.clone(),
    });

    engine.register(Box::new(SendRecv::new(config.netperf_regex()?)));
    engine.register(Box::new(ExitTimes::new()));
    engine.register(Box::new(HwExitTimes::new()));
    engine.register(Box::new(SchedOverhead::new()));
    engine.register(Box::new(
        SchedNetserver::new(&config.netserver_comm)
            .map_err(|e| AnalysisError::BadConfig(e.to_string()))?,
    ));
    engine.register(Box::new(NetDevXmit::new()));
    engine.register(Box::new(SysWritev::new()));
    engine.register(Box::new(SysRead::new(config.tap_fd_marker.clone())));
    engine.register(Box::new(SyscallDelta::read(
        config.tap_fd_marker.clone(),
        config.delta_cpu,
    )));
    engine.register(Box::new(SyscallDelta::writev(
        config.tap_fd_marker.clone(),
        config.delta_cpu,
    )));
    engine.register(Box::new(IrqHandler::new(config.irq_devices.clone())));
    engine.register(Box::new(IoctlInterrupt::new(
        config.interrupt_ioctl_cmds.clone(),
    )));
    engine.register(Box::new(RecvChain::new()));

    if config.batching {
        engine.set_tracker(BatchTracker::new(
            config.halt_reason.clone(),
            config.kick_reason.clone(),
            config.invalidate_events.iter().cloned(),
        ));
    }

    Ok(engine)
}
