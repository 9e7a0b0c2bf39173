//! Raw trace text → [`Event`] sequences.
//!
//! The input dialect is the ftrace text format with the `x86-tsc` clock:
//! a fixed-width process-name prefix, then whitespace-delimited cpu
//! (bracketed), flags, colon-terminated timestamp, colon-terminated event
//! name, and a free-text info tail. Syscall-entry lines embed a
//! parenthesized argument list in the event-name token
//! (`sys_foo(args) ...`); the name is split off and the argument text is
//! folded into the info tail.
//!
//! Header lines (`#`, `CPU:`) and blank lines are skipped silently. A
//! malformed line is an error for that line only: the lenient stream
//! parser logs it and continues without disturbing the order of the
//! surviving events; the strict variant aborts instead.

use std::io::BufRead;

use tracing::warn;

use crate::error::{AnalysisError, LineError};
use crate::event::{Event, ReasonTable, Source};

/// Width of the fixed process-name prefix column.
pub const PROCESS_WIDTH: usize = 23;

/// All events parsed from one source file, in file order.
#[derive(Debug, Clone)]
pub struct TraceStream {
    pub source: Source,
    pub events: Vec<Event>,
    /// Lines that failed to parse and were skipped.
    pub malformed: usize,
}

impl TraceStream {
    /// Parse a whole trace, skipping malformed lines with a warning.
    pub fn parse<R: BufRead>(
        reader: R,
        source: Source,
        reasons: &ReasonTable,
    ) -> Result<Self, AnalysisError> {
        Self::parse_inner(reader, source, reasons, false)
    }

    /// Parse a whole trace, failing on the first malformed line.
    pub fn parse_strict<R: BufRead>(
        reader: R,
        source: Source,
        reasons: &ReasonTable,
    ) -> Result<Self, AnalysisError> {
        Self::parse_inner(reader, source, reasons, true)
    }

    fn parse_inner<R: BufRead>(
        reader: R,
        source: Source,
        reasons: &ReasonTable,
        strict: bool,
    ) -> Result<Self, AnalysisError> {
        let mut events = Vec::new();
        let mut malformed = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            match parse_line(&line, source, reasons) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(cause) if strict => {
                    return Err(AnalysisError::MalformedLine {
                        line: idx + 1,
                        cause,
                    });
                }
                Err(cause) => {
                    warn!(line = idx + 1, %cause, "skipping malformed trace line");
                    malformed += 1;
                }
            }
        }
        Ok(Self {
            source,
            events,
            malformed,
        })
    }
}

/// Parse one line of single-source trace text.
///
/// Returns `Ok(None)` for headers and blank lines.
pub fn parse_line(
    line: &str,
    source: Source,
    reasons: &ReasonTable,
) -> Result<Option<Event>, LineError> {
    let fields = match split_line(line)? {
        Some(fields) => fields,
        None => return Ok(None),
    };
    Ok(Some(fields.into_event(source, reasons)))
}

/// Parse one line of the merged-trace dialect, where the flags token is
/// prefixed with the source tag (`h`/`g`) the event originated from.
pub fn parse_merged_line(line: &str, reasons: &ReasonTable) -> Result<Option<Event>, LineError> {
    let mut fields = match split_line(line)? {
        Some(fields) => fields,
        None => return Ok(None),
    };
    let mut chars = fields.flags.chars();
    let source = chars
        .next()
        .and_then(Source::from_tag)
        .ok_or_else(|| LineError::BadSourceTag(fields.flags.clone()))?;
    fields.flags = chars.as_str().to_string();
    Ok(Some(fields.into_event(source, reasons)))
}

struct LineFields {
    process: String,
    cpu: String,
    flags: String,
    timestamp: i64,
    name: String,
    info: String,
}

impl LineFields {
    fn into_event(self, source: Source, reasons: &ReasonTable) -> Event {
        Event::new(
            source,
            self.process,
            self.cpu,
            self.flags,
            self.timestamp,
            self.name,
            self.info,
            reasons,
        )
    }
}

fn split_line(line: &str) -> Result<Option<LineFields>, LineError> {
    if line.trim().is_empty() || line.starts_with('#') || line.starts_with("CPU:") {
        return Ok(None);
    }
    if line.len() <= PROCESS_WIDTH {
        return Err(LineError::Truncated);
    }
    // Reject lines whose fixed-width column would split a multi-byte
    // character; trace text is ASCII.
    let (prefix, rest) = match (line.get(..PROCESS_WIDTH), line.get(PROCESS_WIDTH..)) {
        (Some(prefix), Some(rest)) => (prefix, rest),
        _ => return Err(LineError::Truncated),
    };

    let process = prefix.trim().to_string();
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let cpu = tokens
        .first()
        .ok_or(LineError::MissingField("cpu"))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let flags = tokens
        .get(1)
        .ok_or(LineError::MissingField("flags"))?
        .to_string();
    let ts_token = tokens.get(2).ok_or(LineError::MissingField("timestamp"))?;
    let timestamp = ts_token
        .trim_end_matches(':')
        .parse::<i64>()
        .map_err(|_| LineError::BadTimestamp((*ts_token).to_string()))?;
    let name_token = *tokens.get(3).ok_or(LineError::MissingField("event name"))?;

    let mut name = name_token.trim_end_matches(':').to_string();
    let mut info = tokens[4..].join(" ");
    if let Some((bare, args)) = name_token.split_once('(') {
        // Syscall-entry dialect: fold the argument list into the info tail.
        name = bare.to_string();
        info = if info.is_empty() {
            args.to_string()
        } else {
            format!("{} {}", args, info)
        };
    }

    Ok(Some(LineFields {
        process,
        cpu,
        flags,
        timestamp,
        name,
        info,
    }))
}
