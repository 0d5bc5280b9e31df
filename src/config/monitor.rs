// src/config/monitor.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG_PATH";

fn default_data_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_inter_source_delay_ms() -> u64 {
    1_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_fix_timeout_floor_secs() -> u64 {
    60
}
fn default_max_listed_issues() -> usize {
    10
}
fn default_summary_window_hours() -> u32 {
    24
}
fn default_schedule_interval_secs() -> u64 {
    3_600
}
fn default_true() -> bool {
    true
}

/// Runtime knobs for the monitor. Every field has a default, so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Explicit catalog path; otherwise the catalog lookup chain applies.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Directory of the JSONL run/check/item store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Pause between two sources in the sequential loop.
    #[serde(default = "default_inter_source_delay_ms")]
    pub inter_source_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Minimum timeout for the extended-timeout feed retry.
    #[serde(default = "default_fix_timeout_floor_secs")]
    pub fix_timeout_floor_secs: u64,
    /// Issues listed individually in an alert before "and N more".
    #[serde(default = "default_max_listed_issues")]
    pub max_listed_issues: usize,
    /// Per-source alert cooldown; 0 disables it.
    #[serde(default)]
    pub alert_cooldown_secs: i64,
    #[serde(default = "default_summary_window_hours")]
    pub summary_window_hours: u32,
    /// 0 disables the background scheduler.
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default)]
    pub fast_mode_scheduled: bool,
    #[serde(default = "default_true")]
    pub fix_issues_scheduled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            data_dir: default_data_dir(),
            inter_source_delay_ms: default_inter_source_delay_ms(),
            default_timeout_secs: default_timeout_secs(),
            fix_timeout_floor_secs: default_fix_timeout_floor_secs(),
            max_listed_issues: default_max_listed_issues(),
            alert_cooldown_secs: 0,
            summary_window_hours: default_summary_window_hours(),
            schedule_interval_secs: default_schedule_interval_secs(),
            fast_mode_scheduled: false,
            fix_issues_scheduled: true,
        }
    }
}

impl MonitorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let cfg: MonitorConfig = if is_toml {
            toml::from_str(&data).context("parsing monitor config toml")?
        } else {
            serde_json::from_str(&data).context("parsing monitor config json")?
        };
        Ok(cfg.sanitized())
    }

    /// `$SENTINEL_CONFIG_PATH` → `config/sentinel.toml` → `config/sentinel.json` → defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(pb);
        }
        for candidate in ["config/sentinel.toml", "config/sentinel.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from_file(pb);
            }
        }
        Ok(Self::default())
    }

    fn sanitized(mut self) -> Self {
        if self.default_timeout_secs == 0 {
            self.default_timeout_secs = default_timeout_secs();
        }
        if self.fix_timeout_floor_secs == 0 {
            self.fix_timeout_floor_secs = default_fix_timeout_floor_secs();
        }
        if self.max_listed_issues == 0 {
            self.max_listed_issues = default_max_listed_issues();
        }
        if self.summary_window_hours == 0 {
            self.summary_window_hours = default_summary_window_hours();
        }
        self.alert_cooldown_secs = self.alert_cooldown_secs.max(0);
        self
    }

    pub fn inter_source_delay(&self) -> Duration {
        Duration::from_millis(self.inter_source_delay_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn fix_timeout_floor(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_floor_secs)
    }

    /// Quiet config for tests and demos: no inter-source delay, short timeouts.
    pub fn for_tests() -> Self {
        Self {
            inter_source_delay_ms: 0,
            default_timeout_secs: 5,
            fix_timeout_floor_secs: 10,
            schedule_interval_secs: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg: MonitorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    fn zero_values_are_sanitized() {
        let cfg: MonitorConfig =
            serde_json::from_str(r#"{"default_timeout_secs":0,"alert_cooldown_secs":-5}"#).unwrap();
        let cfg = cfg.sanitized();
        assert_eq!(cfg.default_timeout_secs, 30);
        assert_eq!(cfg.alert_cooldown_secs, 0);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        // Nothing on disk → defaults
        assert_eq!(MonitorConfig::load_default().unwrap(), MonitorConfig::default());

        // Env wins
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "inter_source_delay_ms = 5\nmax_listed_issues = 3\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = MonitorConfig::load_default().unwrap();
        assert_eq!(cfg.inter_source_delay_ms, 5);
        assert_eq!(cfg.max_listed_issues, 3);
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
