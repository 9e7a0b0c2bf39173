//! Analysis configuration.
//!
//! Every rig-specific heuristic the classifiers rely on (process names,
//! the CPU the vCPU is pinned to, device fd and ioctl command constants,
//! the batch blacklist, the settle margins) is an explicit field here
//! rather than a constant, with the values of the e1000 measurement rig
//! as defaults. Configs load from TOML; unknown keys are
//! rejected so typos surface instead of silently reverting to defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::event::ReasonTable;
use crate::report::{Composite, Selector};
use crate::window::WindowMargins;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Settle margins around the benchmark window.
    pub margins: WindowMargins,

    /// Host CPU the vCPU is pinned to; host events on other CPUs are
    /// dropped before classification. `None` admits every host event.
    pub host_cpu: Option<String>,

    /// Pattern matching the benchmark client process name.
    pub netperf_process: String,

    /// Scheduler comm of the benchmark server on the host.
    pub netserver_comm: String,

    /// Substrings identifying the guest NIC in irq_handler_entry info.
    pub irq_devices: Vec<String>,

    /// Info substring marking reads/writes on the tap device fd.
    pub tap_fd_marker: String,

    /// Info substrings of the interrupt-injection ioctl commands.
    pub interrupt_ioctl_cmds: Vec<String>,

    /// CPU index (numeric) for the back-to-back syscall delta classifiers.
    pub delta_cpu: i64,

    /// Exit-reason substring that marks a halt trigger.
    pub halt_reason: String,

    /// Note-reason substring that marks a kick trigger.
    pub kick_reason: String,

    /// Engage the batch tracker; without it the whole window commits as
    /// one span.
    pub batching: bool,

    /// Event names that disqualify the batch they occur in.
    pub invalidate_events: Vec<String>,

    /// Extra device-register names, merged over the built-in table.
    pub reason_names: BTreeMap<String, String>,

    /// Aggregate every composite (and the CSV sheet) reads per metric.
    pub selector: Selector,

    /// Derived metrics evaluated over the aggregated report.
    pub composites: Vec<Composite>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            margins: WindowMargins::default(),
            host_cpu: Some("002".to_string()),
            netperf_process: "netperf".to_string(),
            netserver_comm: "netserver".to_string(),
            irq_devices: vec!["virtio".to_string(), "eth".to_string()],
            tap_fd_marker: "fd: 11".to_string(),
            interrupt_ioctl_cmds: vec![
                "cmd: 4020aea5".to_string(),
                "cmd: ffffffffc008ae67".to_string(),
            ],
            delta_cpu: 2,
            halt_reason: "HLT".to_string(),
            kick_reason: "KICK".to_string(),
            batching: true,
            invalidate_events: vec![
                "local_timer_entry".to_string(),
                "reschedule_entry".to_string(),
                "irq_work_entry".to_string(),
            ],
            reason_names: BTreeMap::new(),
            selector: Selector::default(),
            composites: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, AnalysisError> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::BadConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.netperf_regex()?;
        if self.margins.begin_secs < 0.0 || self.margins.end_secs < 0.0 {
            return Err(AnalysisError::BadConfig(
                "settle margins must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Compiled matcher for the benchmark client process name.
    pub fn netperf_regex(&self) -> Result<Regex, AnalysisError> {
        Regex::new(&self.netperf_process).map_err(|e| {
            AnalysisError::BadConfig(format!(
                "netperf_process is not a valid pattern: {}",
                e
            ))
        })
    }

    /// The built-in device-register table with this config's overrides.
    pub fn reason_table(&self) -> ReasonTable {
        let mut table = ReasonTable::builtin();
        for (raw, name) in &self.reason_names {
            table.insert(raw.clone(), name.clone());
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.host_cpu.as_deref(), Some("002"));
        assert_eq!(config.delta_cpu, 2);
        assert_eq!(config.selector, Selector::Median);
        assert!(config.batching);
    }

    #[test]
    fn empty_toml_is_the_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = AnalysisConfig::from_toml_str(
            r#"
host_cpu = "000"
selector = "mean"
batching = false
invalidate_events = ["thermal_apic_entry"]

[margins]
begin_secs = 0.25
end_secs = 0.25

[reason_names]
"write 2800" = "E1000 RDBAL"

[[composites]]
name = "guest other"
terms = [
    { label = "guest_sendrecv_netperf", coeff = 1.0 },
    { label = "HW_exit", coeff = -1.0 },
]
"#,
        )
        .unwrap();
        assert_eq!(config.host_cpu.as_deref(), Some("000"));
        assert_eq!(config.selector, Selector::Mean);
        assert!(!config.batching);
        assert_eq!(config.margins.begin_secs, 0.25);
        assert_eq!(config.invalidate_events, vec!["thermal_apic_entry"]);
        assert_eq!(config.composites.len(), 1);
        assert_eq!(config.composites[0].terms.len(), 2);
        assert_eq!(
            config.reason_table().translate("write 2800"),
            "E1000 RDBAL"
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AnalysisConfig::from_toml_str("no_such_key = 1\n").unwrap_err();
        assert!(matches!(err, AnalysisError::BadConfig(_)));
    }

    #[test]
    fn bad_process_pattern_is_rejected() {
        let err = AnalysisConfig::from_toml_str("netperf_process = \"netperf(\"\n").unwrap_err();
        assert!(matches!(err, AnalysisError::BadConfig(_)));
    }

    #[test]
    fn negative_margin_is_rejected() {
        let err = AnalysisConfig::from_toml_str("[margins]\nbegin_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, AnalysisError::BadConfig(_)));
    }
}
