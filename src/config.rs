use crate::error::{CoreError, CoreResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

/// Runtime tuning for the bracket core. Everything has a sensible default so
/// a missing config file is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// When true, a pending match only becomes ready after both sides have
    /// checked in; when false, filling both team slots is enough.
    pub check_in_required: bool,
    pub no_show_ban_threshold: u32,
    pub no_show_ban_days: i64,
    pub delayed_critical_threshold: usize,
    pub paused_critical_threshold: usize,
    pub alert_warning_threshold: usize,
    pub unresolved_issue_warning_threshold: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            check_in_required: false,
            no_show_ban_threshold: NO_SHOW_BAN_THRESHOLD,
            no_show_ban_days: NO_SHOW_BAN_DAYS,
            delayed_critical_threshold: DELAYED_CRITICAL_THRESHOLD,
            paused_critical_threshold: PAUSED_CRITICAL_THRESHOLD,
            alert_warning_threshold: ALERT_WARNING_THRESHOLD,
            unresolved_issue_warning_threshold: UNRESOLVED_ISSUE_WARNING_THRESHOLD,
        }
    }
}

pub fn env_flag_true(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => {
            let value = value.trim().to_ascii_lowercase();
            matches!(value.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => false,
    }
}

fn apply_env_overrides(mut config: CoreConfig) -> CoreConfig {
    if env_flag_true("BRACKET_CHECK_IN_REQUIRED") {
        config.check_in_required = true;
    }
    config
}

/// Load config from a JSON file, falling back to defaults when the file is
/// absent. Environment flags are applied on top either way.
pub fn load_config(path: &Path) -> CoreResult<CoreConfig> {
    if !path.is_file() {
        return Ok(apply_env_overrides(CoreConfig::default()));
    }
    let data = fs::read_to_string(path)
        .map_err(|e| CoreError::validation(format!("read config {}: {e}", path.display())))?;
    let config: CoreConfig = serde_json::from_str(&data)
        .map_err(|e| CoreError::validation(format!("parse config {}: {e}", path.display())))?;
    Ok(apply_env_overrides(config))
}
