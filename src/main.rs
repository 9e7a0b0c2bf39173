use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kvmlat::cli::{Cli, OutputFormat};
use kvmlat::clock::ClockConfig;
use kvmlat::config::AnalysisConfig;
use kvmlat::pipeline::{self, Analysis};
use kvmlat::timeline::MergedTimeline;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn resolve_inputs(cli: &Cli) -> Result<(PathBuf, PathBuf)> {
    match (&cli.dir, &cli.host, &cli.guest) {
        (Some(dir), None, None) => Ok((dir.join("trace_host"), dir.join("trace_guest"))),
        (None, Some(host), Some(guest)) => Ok((host.clone(), guest.clone())),
        _ => bail!("pass either a trace directory or both --host and --guest"),
    }
}

fn write_merged(analysis: &Analysis, path: &PathBuf, window_only: bool) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create merged trace {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    if window_only {
        let windowed = MergedTimeline {
            events: analysis.timeline.events[analysis.window.clone()].to_vec(),
            tsc_offset: analysis.timeline.tsc_offset,
        };
        windowed.write_to(&mut writer)?;
    } else {
        analysis.timeline.write_to(&mut writer)?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let (host_path, guest_path) = resolve_inputs(&cli)?;

    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let clock = match cli.cpu_mhz {
        Some(mhz) => ClockConfig::new(mhz)?,
        None => ClockConfig::from_cpuinfo_file(&cli.cpuinfo)
            .with_context(|| format!("cannot read cpu frequency from {}", cli.cpuinfo.display()))?,
    };

    let host = BufReader::new(
        File::open(&host_path)
            .with_context(|| format!("cannot open host trace {}", host_path.display()))?,
    );
    let guest = BufReader::new(
        File::open(&guest_path)
            .with_context(|| format!("cannot open guest trace {}", guest_path.display()))?,
    );

    let analysis = pipeline::analyze(host, guest, &config, &clock)?;
    if analysis.malformed_lines > 0 {
        eprintln!(
            "warning: skipped {} malformed trace lines",
            analysis.malformed_lines
        );
    }

    if let Some(path) = &cli.write_merged {
        write_merged(&analysis, path, cli.window_only)?;
    }

    match cli.format {
        OutputFormat::Text => print!("{}", analysis.report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analysis.report)?),
        OutputFormat::Csv => print!("{}", analysis.report.to_csv()),
    }

    if let Some(label) = &cli.histogram {
        let Some(metric) = analysis.report.metrics.get(label) else {
            bail!("no metric labeled {:?} in this report", label);
        };
        println!();
        println!("log2 histogram for {}:", label);
        for (bucket, count) in metric.histogram() {
            println!("{} {}", bucket, count);
        }
    }

    if cli.extended {
        println!();
        for (label, metric) in &analysis.report.metrics {
            if let Some(e) = metric.extended(&clock) {
                println!(
                    "{:<31}: stddev {:>9.2} p75 {:>9.2} p90 {:>9.2} p95 {:>9.2} p99 {:>9.2}",
                    label, e.stddev, e.p75, e.p90, e.p95, e.p99
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    run(cli)
}
