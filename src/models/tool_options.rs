use serde::{Deserialize, Serialize};

use crate::error::{HaError, HaResult};

/// The closed set of crawler tuning knobs a job config may carry (spec
/// §4.B). Replaces the source system's dynamic `tool_options` dict with
/// a validated struct, per the REDESIGN FLAG in spec §9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOptions {
    pub initial_workers: u32,
    pub cleanup: bool,
    pub overwrite: bool,
    pub log_level: String,

    pub enable_monitoring: bool,
    pub monitor_interval_seconds: Option<u32>,
    pub stall_timeout_minutes: Option<u32>,
    pub error_threshold_timeout: Option<u32>,
    pub error_threshold_http: Option<u32>,

    pub enable_adaptive_workers: bool,
    pub min_workers: Option<u32>,
    pub max_worker_reductions: Option<u32>,

    pub enable_vpn_rotation: bool,
    pub vpn_connect_command: Option<String>,
    pub max_vpn_rotations: Option<u32>,
    pub vpn_rotation_frequency_minutes: Option<u32>,

    pub backoff_delay_minutes: Option<u32>,
    pub relax_perms: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        ToolOptions {
            initial_workers: 1,
            cleanup: false,
            overwrite: false,
            log_level: "info".to_string(),
            enable_monitoring: false,
            monitor_interval_seconds: None,
            stall_timeout_minutes: None,
            error_threshold_timeout: None,
            error_threshold_http: None,
            enable_adaptive_workers: false,
            min_workers: None,
            max_worker_reductions: None,
            enable_vpn_rotation: false,
            vpn_connect_command: None,
            max_vpn_rotations: None,
            vpn_rotation_frequency_minutes: None,
            backoff_delay_minutes: None,
            relax_perms: false,
        }
    }
}

impl ToolOptions {
    /// Fail-fast validation at config build time (spec §4.B):
    /// adaptive_workers requires monitoring; vpn_rotation requires
    /// monitoring and a non-empty `vpn_connect_command`.
    pub fn validate(&self) -> HaResult<()> {
        if self.initial_workers == 0 {
            return Err(HaError::Validation("initial_workers must be >= 1".to_string()));
        }
        if self.enable_adaptive_workers && !self.enable_monitoring {
            return Err(HaError::Validation(
                "enable_adaptive_workers requires enable_monitoring".to_string(),
            ));
        }
        if self.enable_vpn_rotation {
            if !self.enable_monitoring {
                return Err(HaError::Validation(
                    "enable_vpn_rotation requires enable_monitoring".to_string(),
                ));
            }
            if self.vpn_connect_command.as_deref().unwrap_or("").trim().is_empty() {
                return Err(HaError::Validation(
                    "enable_vpn_rotation requires a non-empty vpn_connect_command".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Build the crawler CLI flags derived from this config: only flags
    /// whose enabling option is true are emitted (spec §4.C).
    pub fn to_cli_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--workers".to_string(),
            self.initial_workers.to_string(),
            "--log-level".to_string(),
            self.log_level.clone(),
        ];

        if self.cleanup {
            flags.push("--cleanup".to_string());
        }
        if self.overwrite {
            flags.push("--overwrite".to_string());
        }
        if self.relax_perms {
            flags.push("--relax-perms".to_string());
        }

        if self.enable_monitoring {
            flags.push("--enable-monitoring".to_string());
            if let Some(v) = self.monitor_interval_seconds {
                flags.push("--monitor-interval-seconds".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.stall_timeout_minutes {
                flags.push("--stall-timeout-minutes".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.error_threshold_timeout {
                flags.push("--error-threshold-timeout".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.error_threshold_http {
                flags.push("--error-threshold-http".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.backoff_delay_minutes {
                flags.push("--backoff-delay-minutes".to_string());
                flags.push(v.to_string());
            }
        }

        if self.enable_adaptive_workers {
            flags.push("--enable-adaptive-workers".to_string());
            if let Some(v) = self.min_workers {
                flags.push("--min-workers".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.max_worker_reductions {
                flags.push("--max-worker-reductions".to_string());
                flags.push(v.to_string());
            }
        }

        if self.enable_vpn_rotation {
            flags.push("--enable-vpn-rotation".to_string());
            if let Some(cmd) = &self.vpn_connect_command {
                flags.push("--vpn-connect-command".to_string());
                flags.push(cmd.clone());
            }
            if let Some(v) = self.max_vpn_rotations {
                flags.push("--max-vpn-rotations".to_string());
                flags.push(v.to_string());
            }
            if let Some(v) = self.vpn_rotation_frequency_minutes {
                flags.push("--vpn-rotation-frequency-minutes".to_string());
                flags.push(v.to_string());
            }
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(ToolOptions::default().validate().is_ok());
    }

    #[test]
    fn adaptive_workers_requires_monitoring() {
        let opts = ToolOptions {
            enable_adaptive_workers: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn vpn_rotation_requires_monitoring_and_command() {
        let opts = ToolOptions {
            enable_vpn_rotation: true,
            enable_monitoring: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = ToolOptions {
            enable_vpn_rotation: true,
            enable_monitoring: true,
            vpn_connect_command: Some("vpn-connect --profile ca".to_string()),
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn flags_only_emitted_when_enabled() {
        let opts = ToolOptions::default();
        let flags = opts.to_cli_flags();
        assert!(!flags.iter().any(|f| f == "--enable-monitoring"));
    }
}
