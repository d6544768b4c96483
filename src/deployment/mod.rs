//! Deployment context: settings, monitor connection, resource registration
//! and the run loop that waits for every registration to settle.
//!
//! The preview flag is also published as a task-local so combinators can
//! read it when they are built, without a handle to the deployment.

pub mod settings;

pub use settings::Settings;

use crate::args;
use crate::error::{Error, Result};
use crate::output::{OutputData, ResourceSet};
use crate::property::Property;
use crate::resources::{OutputMap, Resource, ResourceKind, ResourceOptions, ResourcePackages};
use crate::serialization::constants::*;
use crate::serialization::{Deserializer, Serializer, Struct, Value};
use crate::transport::{InvokeRequest, Monitor, RegisterOutputsRequest, RegisterResourceRequest};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

tokio::task_local! {
    static DRY_RUN: bool;
}

/// Whether the current task runs inside a preview. False outside any
/// deployment scope.
pub fn is_dry_run() -> bool {
    DRY_RUN.try_with(|dry_run| *dry_run).unwrap_or(false)
}

/// Run `fut` with the preview flag set to `dry_run`.
pub async fn with_dry_run<F: Future>(dry_run: bool, fut: F) -> F::Output {
    DRY_RUN.scope(dry_run, fut).await
}

/// Serialized inputs plus, per input, the resources it depends on.
#[derive(Debug, Clone)]
pub struct SerializationResult {
    pub serialized: Struct,
    pub property_to_dependent_resources: IndexMap<String, ResourceSet>,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub provider: Option<Resource>,
    pub version: Option<String>,
}

type Task = (String, JoinHandle<Result<()>>);

struct DeploymentState {
    settings: Settings,
    monitor: Arc<dyn Monitor>,
    packages: ResourcePackages,
    feature_support: Mutex<HashMap<String, bool>>,
    tasks: Mutex<Vec<Task>>,
}

/// Handle to one deployment. Cheap to clone.
#[derive(Clone)]
pub struct Deployment {
    inner: Arc<DeploymentState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sorted, de-duplicated URNs of the resources whose URN is known.
async fn urns_of<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Vec<String> {
    let mut urns = Vec::new();
    for resource in resources {
        if let Some(urn) = resource.raw_urn().value().await {
            urns.push(urn);
        }
    }
    urns.sort();
    urns.dedup();
    urns
}

/// Provider reference `<urn>::<id>`; the id is the unknown sentinel until
/// the provider has one.
async fn provider_reference(provider: &Resource) -> String {
    let urn = provider.raw_urn().value().await.unwrap_or_default();
    let id = match provider.raw_id() {
        Some(id) => id.value().await,
        None => None,
    };
    format!("{}::{}", urn, id.unwrap_or_else(|| UNKNOWN_VALUE.to_string()))
}

/// Arguments as a string-keyed map: records are flattened, maps taken as is.
async fn args_to_map(label: &str, args: &Property) -> Result<IndexMap<String, Property>> {
    match args {
        Property::Args(record) => args::to_map(record.as_ref(), label).await,
        Property::Map(entries) => Ok(entries.clone()),
        Property::Null | Property::Optional(None) => Ok(IndexMap::new()),
        other => Err(Error::Program(format!(
            "{}: arguments must be a record or a map, got {:?}",
            label, other
        ))),
    }
}

impl Deployment {
    pub fn new(settings: Settings, monitor: Arc<dyn Monitor>) -> Self {
        Self::with_packages(settings, monitor, ResourcePackages::new())
    }

    pub fn with_packages(
        settings: Settings,
        monitor: Arc<dyn Monitor>,
        packages: ResourcePackages,
    ) -> Self {
        Self {
            inner: Arc::new(DeploymentState {
                settings,
                monitor,
                packages,
                feature_support: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn is_dry_run(&self) -> bool {
        self.inner.settings.dry_run
    }

    pub fn packages(&self) -> &ResourcePackages {
        &self.inner.packages
    }

    /// Run `program`, then wait for every registration it started.
    ///
    /// The program's own error wins; otherwise the first failed task's
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, program: F) -> Result<T>
    where
        F: FnOnce(Deployment) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let dry_run = self.is_dry_run();
        info!(
            "Running program for {}/{} (preview: {})",
            self.inner.settings.project, self.inner.settings.stack, dry_run
        );
        with_dry_run(dry_run, async {
            let program_result = program(self.clone()).await;
            let tasks_result = self.drain_tasks().await;
            let value = program_result?;
            tasks_result.map(|()| value)
        })
        .await
    }

    /// Track a background task; [`Deployment::run`] waits for it.
    pub fn spawn<F>(&self, description: impl Into<String>, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let description = description.into();
        debug!("Registering task: {}", description);
        let handle = tokio::spawn(with_dry_run(self.is_dry_run(), task));
        lock(&self.inner.tasks).push((description, handle));
    }

    /// Tasks may start further tasks, so keep draining until none are left.
    async fn drain_tasks(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let batch = std::mem::take(&mut *lock(&self.inner.tasks));
            if batch.is_empty() {
                break;
            }
            for (description, handle) in batch {
                let outcome = handle.await.unwrap_or_else(|e| {
                    Err(Error::Program(format!("task '{}' aborted: {}", description, e)))
                });
                match outcome {
                    Ok(()) => debug!("Completed task: {}", description),
                    Err(e) => {
                        error!("{}: {}", description, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Ask the monitor once per feature; later calls hit the cache.
    pub async fn supports_feature(&self, feature: &str) -> Result<bool> {
        let cached = lock(&self.inner.feature_support).get(feature).copied();
        if let Some(supported) = cached {
            return Ok(supported);
        }
        let supported = self.inner.monitor.supports_feature(feature).await?;
        lock(&self.inner.feature_support).insert(feature.to_string(), supported);
        Ok(supported)
    }

    async fn keep_resources(&self) -> Result<bool> {
        if self.inner.settings.disable_resource_references {
            return Ok(false);
        }
        self.supports_feature(FEATURE_RESOURCE_REFERENCES).await
    }

    pub fn register_custom(
        &self,
        type_token: &str,
        name: &str,
        args: impl Into<Property>,
        opts: ResourceOptions,
    ) -> Resource {
        self.register_resource(ResourceKind::Custom, type_token, name, args.into(), opts)
    }

    pub fn register_component(
        &self,
        type_token: &str,
        name: &str,
        args: impl Into<Property>,
        opts: ResourceOptions,
    ) -> Resource {
        self.register_resource(ResourceKind::Component, type_token, name, args.into(), opts)
    }

    /// Declare a resource. The handle is returned at once; its URN, id and
    /// outputs resolve when the monitor answers, or become unknown if the
    /// registration fails.
    pub fn register_resource(
        &self,
        kind: ResourceKind,
        type_token: &str,
        name: &str,
        args: Property,
        opts: ResourceOptions,
    ) -> Resource {
        let (resource, resolver) = Resource::pending(type_token, name, kind);
        let this = self.clone();
        let (type_token, name) = (type_token.to_string(), name.to_string());
        self.spawn(
            format!("register {} {}", type_token, name),
            async move {
                let (urn, id, outputs) = this
                    .register_now(kind, &type_token, &name, &args, &opts)
                    .await?;
                resolver.resolve(urn, id, outputs);
                Ok(())
            },
        );
        resource
    }

    async fn register_now(
        &self,
        kind: ResourceKind,
        type_token: &str,
        name: &str,
        args: &Property,
        opts: &ResourceOptions,
    ) -> Result<(OutputData<String>, Option<OutputData<String>>, OutputData<OutputMap>)> {
        let label = format!("resource:{}[{}]", name, type_token);
        debug!("Preparing {}", label);

        let props = args_to_map(&label, args).await?;
        let keep_resources = self.keep_resources().await?;
        let prepared = self
            .serialize_resource_properties(&label, &props, keep_resources)
            .await?;

        let mut all_dependencies: ResourceSet = prepared
            .property_to_dependent_resources
            .values()
            .flatten()
            .cloned()
            .collect();
        all_dependencies.extend(opts.depends_on.iter().cloned());

        let mut property_dependencies = BTreeMap::new();
        for (key, resources) in &prepared.property_to_dependent_resources {
            property_dependencies.insert(key.clone(), urns_of(resources).await);
        }
        let parent = match &opts.parent {
            Some(parent) => parent.raw_urn().value().await,
            None => None,
        };
        let provider = match &opts.provider {
            Some(provider) => Some(provider_reference(provider).await),
            None => None,
        };

        let request = RegisterResourceRequest {
            type_token: type_token.to_string(),
            name: name.to_string(),
            custom: kind.is_custom(),
            parent,
            object: prepared.serialized,
            protect: opts.protect,
            dependencies: urns_of(&all_dependencies).await,
            provider,
            version: opts.version.clone(),
            property_dependencies,
            accept_secrets: true,
            accept_resources: !self.inner.settings.disable_resource_references,
        };
        if self.inner.settings.excessive_debug_output {
            debug!("RegisterResource RPC prepared: {:?}", request);
        }

        let response = self.inner.monitor.register_resource(request).await?;
        info!("Registered {} as {}", label, response.urn);

        let deserializer = Deserializer::with_packages(&self.inner.packages);
        let mut outputs = OutputMap::new();
        for (key, value) in &response.object {
            if key.starts_with(INTERNAL_KEY_PREFIX) {
                continue;
            }
            outputs.insert(key.clone(), deserializer.deserialize(value)?);
        }
        let id = kind
            .is_custom()
            .then(|| match response.id.filter(|id| !id.is_empty()) {
                Some(id) => OutputData::known(id),
                None => OutputData::unknown(),
            });
        Ok((
            OutputData::known(response.urn),
            id,
            OutputData::known(outputs),
        ))
    }

    /// Publish a component's outputs once they resolve.
    pub fn register_outputs(&self, resource: &Resource, outputs: IndexMap<String, Property>) {
        let this = self.clone();
        let resource = resource.clone();
        self.spawn(
            format!("register outputs of {}", resource.name()),
            async move {
                let label = format!("outputs:{}[{}]", resource.name(), resource.type_token());
                let keep_resources = this.keep_resources().await?;
                let outputs = this
                    .serialize_all_properties(&label, &outputs, keep_resources)
                    .await?;
                let urn = resource.raw_urn().value().await.ok_or_else(|| {
                    Error::Program(format!("{}: resource was never registered", label))
                })?;
                debug!("Registering outputs for {}", urn);
                this.inner
                    .monitor
                    .register_resource_outputs(RegisterOutputsRequest { urn, outputs })
                    .await
            },
        );
    }

    /// Call a provider function and return its deserialized result.
    pub async fn invoke(
        &self,
        token: &str,
        args: Property,
        opts: InvokeOptions,
    ) -> Result<OutputData<Property>> {
        let label = format!("invoke:{}", token);
        debug!("Invoking function: token='{}'", token);

        let props = args_to_map(&label, &args).await?;
        let keep_resources = self.keep_resources().await?;
        let serialized = self
            .serialize_all_properties(&label, &props, keep_resources)
            .await?;
        let provider = match &opts.provider {
            Some(provider) => Some(provider_reference(provider).await),
            None => None,
        };

        let response = self
            .inner
            .monitor
            .invoke(InvokeRequest {
                token: token.to_string(),
                args: serialized,
                provider,
                version: opts.version,
                accept_resources: !self.inner.settings.disable_resource_references,
            })
            .await?;

        if !response.failures.is_empty() {
            let reasons = response
                .failures
                .iter()
                .map(|f| format!("{} ({})", f.reason, f.property))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::InvokeFailed {
                token: token.to_string(),
                reasons,
            });
        }
        Deserializer::with_packages(&self.inner.packages).deserialize(&Value::Struct(response.ret))
    }

    /// Serialize resource inputs, skipping the engine-owned `id` and `urn`.
    pub async fn serialize_resource_properties(
        &self,
        label: &str,
        props: &IndexMap<String, Property>,
        keep_resources: bool,
    ) -> Result<SerializationResult> {
        self.serialize_filtered_properties(
            label,
            props,
            |key| key != ID_PROPERTY_NAME && key != URN_PROPERTY_NAME,
            keep_resources,
        )
        .await
    }

    pub async fn serialize_all_properties(
        &self,
        label: &str,
        props: &IndexMap<String, Property>,
        keep_resources: bool,
    ) -> Result<Struct> {
        Ok(self
            .serialize_filtered_properties(label, props, |_| true, keep_resources)
            .await?
            .serialized)
    }

    /// Properties that serialize to null are treated as absent, dependencies
    /// included.
    async fn serialize_filtered_properties(
        &self,
        label: &str,
        props: &IndexMap<String, Property>,
        accept_key: impl Fn(&str) -> bool,
        keep_resources: bool,
    ) -> Result<SerializationResult> {
        let mut serialized = Struct::new();
        let mut property_to_dependent_resources = IndexMap::new();
        for (key, value) in props {
            if !accept_key(key) {
                continue;
            }
            let mut serializer = Serializer::new(self.inner.settings.excessive_debug_output);
            let ctx = format!("{}.{}", label, key);
            let wire = serializer.serialize(&ctx, value, keep_resources).await?;
            if wire.is_null() {
                continue;
            }
            serialized.insert(key.clone(), wire);
            property_to_dependent_resources.insert(key.clone(), serializer.into_dependent_resources());
        }
        Ok(SerializationResult {
            serialized,
            property_to_dependent_resources,
        })
    }
}
