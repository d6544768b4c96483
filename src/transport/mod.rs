//! Engine transport: the monitor RPC surface.
//!
//! Requests and responses carry fully assembled wire trees; the monitor
//! never sees outputs or resource handles.

pub mod local;

use crate::error::Result;
use crate::serialization::Struct;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterResourceRequest {
    #[serde(rename = "type")]
    pub type_token: String,
    pub name: String,
    pub custom: bool,
    /// Parent URN.
    pub parent: Option<String>,
    pub object: Struct,
    pub protect: bool,
    /// URNs this resource depends on, sorted.
    pub dependencies: Vec<String>,
    /// Provider reference, `<urn>::<id>`.
    pub provider: Option<String>,
    pub version: Option<String>,
    /// Per-input dependency URNs, sorted.
    pub property_dependencies: BTreeMap<String, Vec<String>>,
    pub accept_secrets: bool,
    pub accept_resources: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterResourceResponse {
    pub urn: String,
    /// Empty or absent while the id is not yet known.
    pub id: Option<String>,
    pub object: Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterOutputsRequest {
    pub urn: String,
    pub outputs: Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeRequest {
    pub token: String,
    pub args: Struct,
    pub provider: Option<String>,
    pub version: Option<String>,
    pub accept_resources: bool,
}

/// A provider-side validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckFailure {
    pub property: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InvokeResponse {
    pub ret: Struct,
    pub failures: Vec<CheckFailure>,
}

/// Every call a monitor received, for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum MonitorRequest {
    SupportsFeature { feature: String },
    RegisterResource(RegisterResourceRequest),
    RegisterOutputs(RegisterOutputsRequest),
    Invoke(InvokeRequest),
}

/// The engine's resource monitor.
#[async_trait]
pub trait Monitor: Send + Sync {
    async fn supports_feature(&self, feature: &str) -> Result<bool>;

    async fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisterResourceResponse>;

    async fn register_resource_outputs(&self, request: RegisterOutputsRequest) -> Result<()>;

    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse>;
}
