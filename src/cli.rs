//! CLI argument parsing for kvmlat.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output format for the aggregated report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Fixed-width text table (default)
    Text,
    /// JSON for machine parsing
    Json,
    /// CSV sheet with per-batch counts and composite rows
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "kvmlat")]
#[command(version)]
#[command(about = "Kernel-trace correlation and latency decomposition for KVM network benchmarks", long_about = None)]
pub struct Cli {
    /// Directory containing trace_host and trace_guest
    pub dir: Option<PathBuf>,

    /// Host trace file (overrides the directory convention)
    #[arg(long, value_name = "FILE")]
    pub host: Option<PathBuf>,

    /// Guest trace file (overrides the directory convention)
    #[arg(long, value_name = "FILE")]
    pub guest: Option<PathBuf>,

    /// Analysis configuration (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CPU frequency in MHz, bypassing the cpuinfo file
    #[arg(long = "cpu-mhz", value_name = "MHZ")]
    pub cpu_mhz: Option<f64>,

    /// cpuinfo-format file to read the CPU frequency from
    #[arg(long, value_name = "FILE", default_value = "/proc/cpuinfo")]
    pub cpuinfo: PathBuf,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the synchronized merged trace to this file
    #[arg(long = "write-merged", value_name = "FILE")]
    pub write_merged: Option<PathBuf>,

    /// Restrict the merged-trace output to the benchmark window
    #[arg(long = "window-only", requires = "write_merged")]
    pub window_only: bool,

    /// Print a log2 latency histogram for one metric label
    #[arg(long, value_name = "LABEL")]
    pub histogram: Option<String>,

    /// Print extended statistics (stddev, tail percentiles) per metric
    #[arg(long)]
    pub extended: bool,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_directory() {
        let cli = Cli::parse_from(["kvmlat", "/tmp/traces"]);
        assert_eq!(cli.dir.unwrap().to_str(), Some("/tmp/traces"));
        assert!(cli.host.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_explicit_files() {
        let cli = Cli::parse_from([
            "kvmlat",
            "--host",
            "/tmp/trace_host",
            "--guest",
            "/tmp/trace_guest",
        ]);
        assert!(cli.dir.is_none());
        assert!(cli.host.is_some());
        assert!(cli.guest.is_some());
    }

    #[test]
    fn test_cli_cpu_mhz_override() {
        let cli = Cli::parse_from(["kvmlat", "/tmp/traces", "--cpu-mhz", "2400"]);
        assert_eq!(cli.cpu_mhz, Some(2400.0));
    }

    #[test]
    fn test_cli_format_values() {
        let cli = Cli::parse_from(["kvmlat", "/tmp/traces", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        let cli = Cli::parse_from(["kvmlat", "/tmp/traces", "--format", "csv"]);
        assert_eq!(cli.format, OutputFormat::Csv);
    }

    #[test]
    fn test_cli_window_only_requires_write_merged() {
        assert!(Cli::try_parse_from(["kvmlat", "/tmp/traces", "--window-only"]).is_err());
        let cli = Cli::parse_from([
            "kvmlat",
            "/tmp/traces",
            "--write-merged",
            "/tmp/merged",
            "--window-only",
        ]);
        assert!(cli.window_only);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["kvmlat", "/tmp/traces"]);
        assert!(!cli.debug);
        assert!(!cli.extended);
        assert!(cli.histogram.is_none());
        assert_eq!(cli.cpuinfo.to_str(), Some("/proc/cpuinfo"));
    }
}
