//! In-memory engine: a [`Monitor`] that accepts every registration locally.
//!
//! URNs follow `urn:pulumi:<stack>::<project>::[<parent-type>$]<type>::<name>`.
//! Custom resources get an id derived from the BLAKE3 hash of their URN,
//! except during preview where ids stay unknown. Inputs are echoed back as
//! outputs. Every request is recorded.

use super::*;
use crate::error::Error;
use crate::resources::urn::Urn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Handler for a function invoked through the engine.
pub type FunctionHandler = Arc<dyn Fn(&Struct) -> InvokeResponse + Send + Sync>;

/// Token of the built-in function that returns its arguments.
pub const ECHO_FUNCTION: &str = "strata:index:echo";

#[derive(Default)]
struct EngineState {
    requests: Vec<MonitorRequest>,
    /// Registered type token by URN.
    resources: HashMap<String, String>,
    outputs: HashMap<String, Struct>,
}

pub struct LocalEngine {
    stack: String,
    project: String,
    dry_run: bool,
    resource_references: bool,
    functions: HashMap<String, FunctionHandler>,
    state: Mutex<EngineState>,
}

impl LocalEngine {
    pub fn new(stack: impl Into<String>, project: impl Into<String>, dry_run: bool) -> Self {
        let mut functions: HashMap<String, FunctionHandler> = HashMap::new();
        functions.insert(
            ECHO_FUNCTION.to_string(),
            Arc::new(|args: &Struct| InvokeResponse {
                ret: args.clone(),
                failures: vec![],
            }),
        );
        Self {
            stack: stack.into(),
            project: project.into(),
            dry_run,
            resource_references: true,
            functions,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Report the resource-reference feature as unsupported.
    pub fn without_resource_references(mut self) -> Self {
        self.resource_references = false;
        self
    }

    pub fn with_function<F>(mut self, token: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Struct) -> InvokeResponse + Send + Sync + 'static,
    {
        self.functions.insert(token.into(), Arc::new(handler));
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| Error::Monitor("engine state lock poisoned".into()))
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<MonitorRequest> {
        self.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Registration requests, in arrival order.
    pub fn registrations(&self) -> Vec<RegisterResourceRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                MonitorRequest::RegisterResource(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    /// Outputs registered for a component URN.
    pub fn registered_outputs(&self, urn: &str) -> Option<Struct> {
        self.lock().ok()?.outputs.get(urn).cloned()
    }

    fn make_id(urn: &str, name: &str) -> String {
        let hash = blake3::hash(urn.as_bytes()).to_hex();
        format!("{}-{}", name, &hash.as_str()[..8])
    }
}

#[async_trait]
impl Monitor for LocalEngine {
    async fn supports_feature(&self, feature: &str) -> Result<bool> {
        self.lock()?.requests.push(MonitorRequest::SupportsFeature {
            feature: feature.to_string(),
        });
        Ok(match feature {
            crate::serialization::constants::FEATURE_RESOURCE_REFERENCES => {
                self.resource_references
            }
            "secrets" => true,
            _ => false,
        })
    }

    async fn register_resource(
        &self,
        request: RegisterResourceRequest,
    ) -> Result<RegisterResourceResponse> {
        let mut state = self.lock()?;
        state
            .requests
            .push(MonitorRequest::RegisterResource(request.clone()));

        let parent_type = match &request.parent {
            Some(parent) => Some(Urn::parse(parent)?.qualified_type),
            None => None,
        };
        let urn = Urn::create(
            &self.stack,
            &self.project,
            parent_type.as_deref(),
            &request.type_token,
            &request.name,
        )
        .to_string();
        if state.resources.contains_key(&urn) {
            return Err(Error::Monitor(format!("duplicate resource URN '{}'", urn)));
        }
        state
            .resources
            .insert(urn.clone(), request.type_token.clone());

        let id = (request.custom && !self.dry_run).then(|| Self::make_id(&urn, &request.name));
        debug!("Registered {} (id {:?})", urn, id);
        Ok(RegisterResourceResponse {
            urn,
            id,
            object: request.object,
        })
    }

    async fn register_resource_outputs(&self, request: RegisterOutputsRequest) -> Result<()> {
        let mut state = self.lock()?;
        state
            .requests
            .push(MonitorRequest::RegisterOutputs(request.clone()));
        if !state.resources.contains_key(&request.urn) {
            return Err(Error::Monitor(format!(
                "outputs registered for unknown resource '{}'",
                request.urn
            )));
        }
        state.outputs.insert(request.urn, request.outputs);
        Ok(())
    }

    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse> {
        self.lock()?
            .requests
            .push(MonitorRequest::Invoke(request.clone()));
        let handler = self
            .functions
            .get(&request.token)
            .ok_or_else(|| Error::Monitor(format!("unknown function '{}'", request.token)))?;
        Ok(handler(&request.args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::Value;

    fn request(type_token: &str, name: &str, parent: Option<&str>) -> RegisterResourceRequest {
        RegisterResourceRequest {
            type_token: type_token.into(),
            name: name.into(),
            custom: true,
            parent: parent.map(str::to_string),
            object: Struct::from([("size".to_string(), Value::Number(1.0))]),
            protect: false,
            dependencies: vec![],
            provider: None,
            version: None,
            property_dependencies: BTreeMap::new(),
            accept_secrets: true,
            accept_resources: true,
        }
    }

    #[tokio::test]
    async fn test_local_register_assigns_urn_and_id() {
        let engine = LocalEngine::new("dev", "web", false);
        let resp = engine
            .register_resource(request("pkg:index:Thing", "a", None))
            .await
            .unwrap();
        assert_eq!(resp.urn, "urn:pulumi:dev::web::pkg:index:Thing::a");
        let id = resp.id.unwrap();
        assert!(id.starts_with("a-"));
        assert_eq!(id.len(), "a-".len() + 8);
        assert_eq!(resp.object["size"], Value::Number(1.0));
    }

    #[tokio::test]
    async fn test_local_id_is_deterministic() {
        let a = LocalEngine::new("dev", "web", false);
        let b = LocalEngine::new("dev", "web", false);
        let ra = a.register_resource(request("pkg:index:Thing", "x", None)).await.unwrap();
        let rb = b.register_resource(request("pkg:index:Thing", "x", None)).await.unwrap();
        assert_eq!(ra.id, rb.id);
    }

    #[tokio::test]
    async fn test_local_preview_has_no_id() {
        let engine = LocalEngine::new("dev", "web", true);
        let resp = engine
            .register_resource(request("pkg:index:Thing", "a", None))
            .await
            .unwrap();
        assert!(resp.id.is_none());
    }

    #[tokio::test]
    async fn test_local_parent_nests_type() {
        let engine = LocalEngine::new("dev", "web", false);
        let parent = engine
            .register_resource(request("my:index:Site", "site", None))
            .await
            .unwrap();
        let child = engine
            .register_resource(request("pkg:index:Thing", "t", Some(&parent.urn)))
            .await
            .unwrap();
        assert_eq!(child.urn, "urn:pulumi:dev::web::my:index:Site$pkg:index:Thing::t");
    }

    #[tokio::test]
    async fn test_local_duplicate_urn_rejected() {
        let engine = LocalEngine::new("dev", "web", false);
        engine.register_resource(request("pkg:index:Thing", "a", None)).await.unwrap();
        let err = engine
            .register_resource(request("pkg:index:Thing", "a", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Monitor(_)));
    }

    #[tokio::test]
    async fn test_local_invoke_echo_and_unknown() {
        let engine = LocalEngine::new("dev", "web", false);
        let args = Struct::from([("q".to_string(), Value::from("v"))]);
        let resp = engine
            .invoke(InvokeRequest {
                token: ECHO_FUNCTION.into(),
                args: args.clone(),
                provider: None,
                version: None,
                accept_resources: true,
            })
            .await
            .unwrap();
        assert_eq!(resp.ret, args);
        let err = engine
            .invoke(InvokeRequest {
                token: "nope:index:fn".into(),
                args,
                provider: None,
                version: None,
                accept_resources: true,
            })
            .await;
        assert!(err.is_err());
        assert_eq!(engine.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_local_features() {
        let engine = LocalEngine::new("dev", "web", false).without_resource_references();
        assert!(!engine.supports_feature("resourceReferences").await.unwrap());
        assert!(engine.supports_feature("secrets").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_register_outputs_requires_resource() {
        let engine = LocalEngine::new("dev", "web", false);
        let err = engine
            .register_resource_outputs(RegisterOutputsRequest {
                urn: "urn:pulumi:dev::web::my:index:Site::s".into(),
                outputs: Struct::new(),
            })
            .await;
        assert!(err.is_err());
    }
}
