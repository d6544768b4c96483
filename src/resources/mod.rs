//! Resource handles.
//!
//! A [`Resource`] is a cheap, shareable handle to a declared resource whose
//! URN, id and output properties arrive later from the engine. Handles hash
//! and compare by identity, so they can live in dependency sets.

pub mod options;
pub mod urn;

pub use options::ResourceOptions;

use crate::output::{Output, OutputData, ResourceSet};
use crate::property::Property;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Resolved output properties of a resource, each with its own flags.
pub type OutputMap = IndexMap<String, OutputData<Property>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Managed by a provider; has an id.
    Custom,
    /// A logical grouping; identified by URN only.
    Component,
    /// A reference to a resource known only by URN (and maybe id).
    Dependency,
}

impl ResourceKind {
    /// Custom and dependency resources are referenced by id on the wire.
    pub fn is_custom(self) -> bool {
        !matches!(self, Self::Component)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Component => write!(f, "component"),
            Self::Dependency => write!(f, "dependency"),
        }
    }
}

struct ResourceState {
    type_token: String,
    name: String,
    kind: ResourceKind,
    urn: Output<String>,
    id: Option<Output<String>>,
    outputs: Output<OutputMap>,
}

#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceState>,
}

/// Completes the pending fields of a [`Resource`]. Dropping it unresolved
/// leaves every field unknown.
pub struct ResourceResolver {
    urn: oneshot::Sender<OutputData<String>>,
    id: Option<oneshot::Sender<OutputData<String>>>,
    outputs: oneshot::Sender<OutputData<OutputMap>>,
}

fn receiver_output<T>(rx: oneshot::Receiver<OutputData<T>>) -> Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    Output::from_data_future(async move { rx.await.unwrap_or_else(|_| OutputData::unknown()) })
}

impl Resource {
    /// A resource whose URN, id and outputs are filled in by the returned
    /// resolver once the engine answers.
    pub fn pending(
        type_token: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
    ) -> (Self, ResourceResolver) {
        let (urn_tx, urn_rx) = oneshot::channel();
        let (outputs_tx, outputs_rx) = oneshot::channel();
        let (id_tx, id) = if kind.is_custom() {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(receiver_output(rx)))
        } else {
            (None, None)
        };
        let resource = Self {
            inner: Arc::new(ResourceState {
                type_token: type_token.into(),
                name: name.into(),
                kind,
                urn: receiver_output(urn_rx),
                id,
                outputs: receiver_output(outputs_rx),
            }),
        };
        let resolver = ResourceResolver {
            urn: urn_tx,
            id: id_tx,
            outputs: outputs_tx,
        };
        (resource, resolver)
    }

    /// Rehydrate a resource from its URN. Custom-like kinds carry `id`, or an
    /// unknown id when none is given.
    pub fn from_urn(kind: ResourceKind, urn: impl Into<String>, id: Option<String>) -> Self {
        let urn = urn.into();
        let (type_token, name) = match urn::Urn::parse(&urn) {
            Ok(parsed) => (parsed.type_token().to_string(), parsed.name),
            Err(_) => (String::new(), String::new()),
        };
        let id = kind.is_custom().then(|| match id {
            Some(id) => Output::new(id),
            None => Output::unknown(),
        });
        Self {
            inner: Arc::new(ResourceState {
                type_token,
                name,
                kind,
                urn: Output::new(urn),
                id,
                outputs: Output::new(OutputMap::new()),
            }),
        }
    }

    /// A resource known only by URN.
    pub fn dependency(urn: impl Into<String>) -> Self {
        Self::from_urn(ResourceKind::Dependency, urn, None)
    }

    pub fn dependency_with_id(urn: impl Into<String>, id: impl Into<String>) -> Self {
        Self::from_urn(ResourceKind::Dependency, urn, Some(id.into()))
    }

    pub fn type_token(&self) -> &str {
        &self.inner.type_token
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn is_custom(&self) -> bool {
        self.inner.kind.is_custom()
    }

    fn as_dependency(&self) -> ResourceSet {
        ResourceSet::from([self.clone()])
    }

    /// The URN, depending on this resource.
    pub fn urn(&self) -> Output<String> {
        self.inner.urn.depends_on(self.as_dependency())
    }

    /// The provider-assigned id, depending on this resource. `None` for
    /// components.
    pub fn id(&self) -> Option<Output<String>> {
        self.inner
            .id
            .as_ref()
            .map(|id| id.depends_on(self.as_dependency()))
    }

    /// One output property, depending on this resource. A property the
    /// engine did not return resolves to a known null.
    pub fn output(&self, property: &str) -> Output<Property> {
        let property = property.to_string();
        self.inner
            .outputs
            .apply_output(move |mut outputs| {
                Output::from_data(
                    outputs
                        .shift_remove(&property)
                        .unwrap_or_else(OutputData::empty),
                )
            })
            .depends_on(self.as_dependency())
    }

    /// All output properties as one map output.
    pub fn outputs(&self) -> Output<Property> {
        self.inner
            .outputs
            .apply_output(|outputs| {
                Output::<Property>::join_map(
                    outputs
                        .into_iter()
                        .map(|(k, v)| (k, Output::from_data(v)))
                        .collect(),
                )
            })
            .depends_on(self.as_dependency())
    }

    pub(crate) fn raw_urn(&self) -> Output<String> {
        self.inner.urn.clone()
    }

    pub(crate) fn raw_id(&self) -> Option<Output<String>> {
        self.inner.id.clone()
    }
}

impl ResourceResolver {
    pub fn resolve(
        self,
        urn: OutputData<String>,
        id: Option<OutputData<String>>,
        outputs: OutputData<OutputMap>,
    ) {
        // Receivers dropped means nobody is listening; nothing to do.
        let _ = self.urn.send(urn);
        if let (Some(tx), Some(id)) = (self.id, id) {
            let _ = tx.send(id);
        }
        let _ = self.outputs.send(outputs);
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &self.inner.type_token)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// Builds a resource from `(urn, id)` when a reference is deserialized.
pub type ResourceConstructor = Arc<dyn Fn(&str, Option<&str>) -> Resource + Send + Sync>;

#[derive(Clone)]
struct PackageEntry {
    version: Option<String>,
    construct: ResourceConstructor,
}

/// Registry of resource constructors keyed by type token.
#[derive(Clone, Default)]
pub struct ResourcePackages {
    constructors: HashMap<String, Vec<PackageEntry>>,
}

impl ResourcePackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_token: &str, version: Option<&str>, construct: F)
    where
        F: Fn(&str, Option<&str>) -> Resource + Send + Sync + 'static,
    {
        self.constructors
            .entry(type_token.to_string())
            .or_default()
            .push(PackageEntry {
                version: version.map(str::to_string),
                construct: Arc::new(construct),
            });
    }

    /// Register a type whose references rehydrate as plain handles of `kind`.
    pub fn register_kind(&mut self, type_token: &str, version: Option<&str>, kind: ResourceKind) {
        self.register(type_token, version, move |urn, id| {
            Resource::from_urn(kind, urn, id.map(str::to_string))
        });
    }

    pub fn contains(&self, type_token: &str) -> bool {
        self.constructors.contains_key(type_token)
    }

    /// Construct a resource for `type_token`. An exact version match wins,
    /// then an unversioned registration, then (when no version was asked
    /// for) the first registration.
    pub fn try_construct(
        &self,
        type_token: &str,
        version: Option<&str>,
        urn: &str,
        id: Option<&str>,
    ) -> Option<Resource> {
        let entries = self.constructors.get(type_token)?;
        let entry = match version.filter(|v| !v.is_empty()) {
            Some(v) => entries
                .iter()
                .find(|e| e.version.as_deref() == Some(v))
                .or_else(|| entries.iter().find(|e| e.version.is_none())),
            None => entries.first(),
        }?;
        Some((entry.construct)(urn, id))
    }
}

impl fmt::Debug for ResourcePackages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.constructors.keys().collect();
        types.sort();
        f.debug_struct("ResourcePackages")
            .field("types", &types)
            .finish()
    }
}
