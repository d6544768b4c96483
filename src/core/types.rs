//! Program file schema (`strata.yaml`).
//!
//! A program declares resources by logical key. Property values are plain
//! YAML plus two extensions: `${key.prop}` interpolation inside strings and
//! single-key `fn::*` mappings.

use crate::deployment::Settings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Top-level strata.yaml
// ============================================================================

/// Root of a program file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Program name; doubles as the project name when no settings block
    /// names one
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Deployment settings; CLI flags and `STRATA_*` variables override it
    #[serde(default)]
    pub settings: Option<Settings>,

    /// Resource declarations (order-preserving)
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,

    /// Stack outputs, evaluated after every resource is declared
    #[serde(default)]
    pub outputs: IndexMap<String, serde_yaml_ng::Value>,
}

impl ProgramConfig {
    /// Settings block with the program name as project fallback.
    pub fn effective_settings(&self) -> Settings {
        match &self.settings {
            Some(settings) => settings.clone(),
            None => Settings {
                project: self.name.clone(),
                ..Settings::default()
            },
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// One declared resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Type token, `<package>:<module>:<type>`
    #[serde(rename = "type")]
    pub type_token: String,

    /// Engine-visible name; defaults to the declaration key
    #[serde(default)]
    pub name: Option<String>,

    /// Register as a component instead of a custom resource
    #[serde(default)]
    pub component: bool,

    #[serde(default)]
    pub properties: IndexMap<String, serde_yaml_ng::Value>,

    /// Explicit dependencies (other resource keys)
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Parent resource key; defaults to the stack
    #[serde(default)]
    pub parent: Option<String>,

    /// Provider resource key
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub protect: bool,

    /// Provider plugin version
    #[serde(default)]
    pub version: Option<String>,
}

impl ResourceDecl {
    pub fn kind_label(&self) -> &'static str {
        if self.component {
            "component"
        } else {
            "custom"
        }
    }
}

// ============================================================================
// Interpolation
// ============================================================================

/// A `${key.path}` reference inside a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Resource key
    pub resource: String,
    /// Property path; empty refers to the resource itself
    pub path: Vec<String>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}", self.resource)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        write!(f, "}}")
    }
}

/// A parsed interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(Reference),
}

// ============================================================================
// Property functions
// ============================================================================

/// Single-key `fn::<name>` mappings recognised in property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFn {
    Secret,
    Asset,
    Archive,
    Invoke,
}

impl PropertyFn {
    pub const PREFIX: &'static str = "fn::";

    pub fn from_key(key: &str) -> Option<Self> {
        match key.strip_prefix(Self::PREFIX)? {
            "secret" => Some(Self::Secret),
            "asset" => Some(Self::Asset),
            "archive" => Some(Self::Archive),
            "invoke" => Some(Self::Invoke),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret => write!(f, "fn::secret"),
            Self::Asset => write!(f, "fn::asset"),
            Self::Archive => write!(f, "fn::archive"),
            Self::Invoke => write!(f, "fn::invoke"),
        }
    }
}

/// Single-key mapping whose key starts with `fn::`, if `value` is one.
pub fn as_function_call(value: &serde_yaml_ng::Value) -> Option<(&str, &serde_yaml_ng::Value)> {
    let mapping = value.as_mapping()?;
    if mapping.len() != 1 {
        return None;
    }
    let (key, arg) = mapping.iter().next()?;
    let key = key.as_str()?;
    key.starts_with(PropertyFn::PREFIX).then_some((key, arg))
}

// ============================================================================
// Run results
// ============================================================================

/// What one resource resolved to after a run.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub key: String,
    #[serde(rename = "type")]
    pub type_token: String,
    pub urn: Option<String>,
    pub id: Option<String>,
    pub outputs: serde_json::Value,
}

/// Result of executing a program.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stack_urn: Option<String>,
    pub preview: bool,
    pub resources: Vec<ResourceSummary>,
    pub outputs: IndexMap<String, serde_json::Value>,
}
