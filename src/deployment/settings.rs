//! Deployment settings: YAML block, then environment overrides.

use serde::{Deserialize, Serialize};

pub const ENV_STACK: &str = "STRATA_STACK";
pub const ENV_PROJECT: &str = "STRATA_PROJECT";
pub const ENV_DRY_RUN: &str = "STRATA_DRY_RUN";
pub const ENV_EXCESSIVE_DEBUG_OUTPUT: &str = "STRATA_EXCESSIVE_DEBUG_OUTPUT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub project: String,
    pub stack: String,
    pub organization: Option<String>,
    /// Preview: the engine may leave values unknown.
    pub dry_run: bool,
    /// Log every serializer step at debug level.
    pub excessive_debug_output: bool,
    /// Never send resource reference markers, even when the monitor
    /// supports them.
    pub disable_resource_references: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: "project".to_string(),
            stack: "dev".to_string(),
            organization: None,
            dry_run: false,
            excessive_debug_output: false,
            disable_resource_references: false,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("settings parse error: {}", e))
    }

    /// Apply `STRATA_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable flags are ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(stack) = lookup(ENV_STACK).filter(|s| !s.is_empty()) {
            self.stack = stack;
        }
        if let Some(project) = lookup(ENV_PROJECT).filter(|s| !s.is_empty()) {
            self.project = project;
        }
        if let Some(flag) = lookup(ENV_DRY_RUN).as_deref().and_then(parse_flag) {
            self.dry_run = flag;
        }
        if let Some(flag) = lookup(ENV_EXCESSIVE_DEBUG_OUTPUT)
            .as_deref()
            .and_then(parse_flag)
        {
            self.excessive_debug_output = flag;
        }
        self
    }
}
