//! Dynamic property graphs: the live object graph handed to the serializer
//! and the shape the deserializer rebuilds from wire values.

use crate::args::InputArgs;
use crate::asset::{Archive, Asset, AssetOrArchive};
use crate::output::Output;
use crate::resources::Resource;
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A raw pending computation that was never wrapped in an [`Output`].
///
/// Building one is allowed; serializing one is not.
#[derive(Clone)]
pub struct Pending(Shared<BoxFuture<'static, Property>>);

impl Pending {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Property> + Send + 'static,
    {
        Self(fut.boxed().shared())
    }

    /// Promote the computation into a known, non-secret output.
    pub fn into_output(self) -> Output<Property> {
        Output::from_future(self.0)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pending(..)")
    }
}

/// One node of a property graph.
#[derive(Debug, Clone, Default)]
pub enum Property {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// An optional wrapper; `None` serializes as null.
    Optional(Option<Box<Property>>),
    /// A declared argument record, flattened on serialization.
    Args(Arc<dyn InputArgs>),
    Asset(Asset),
    Archive(Archive),
    Pending(Pending),
    Output(Output<Property>),
    Resource(Resource),
    /// A raw JSON document, mapped structurally.
    Json(serde_json::Value),
    List(Vec<Property>),
    Map(IndexMap<String, Property>),
    /// A host value with no wire mapping.
    Opaque { type_name: String },
}

impl Property {
    /// Placeholder for a host value of type `T` that cannot be serialized.
    pub fn opaque<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::Opaque {
            type_name: short.to_string(),
        }
    }

    pub fn optional(value: Option<Property>) -> Self {
        Self::Optional(value.map(Box::new))
    }

    pub fn args(args: impl InputArgs + 'static) -> Self {
        Self::Args(Arc::new(args))
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Property)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Optional(None))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Property>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Property]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// Plain JSON rendering for data-only graphs. `None` when the graph holds
    /// anything that is not plain data (outputs, resources, assets, ...).
    pub fn to_plain_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as J;
        Some(match self {
            Self::Null | Self::Optional(None) => J::Null,
            Self::Optional(Some(inner)) => inner.to_plain_json()?,
            Self::Bool(b) => J::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map(J::Number)?,
            Self::String(s) => J::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::List(items) => J::Array(
                items
                    .iter()
                    .map(Property::to_plain_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Self::Map(entries) => J::Object(
                entries
                    .iter()
                    .map(|(k, v)| v.to_plain_json().map(|v| (k.clone(), v)))
                    .collect::<Option<serde_json::Map<_, _>>>()?,
            ),
            _ => return None,
        })
    }
}

impl PartialEq for Property {
    /// Structural equality for data nodes. Outputs and pending computations
    /// never compare equal; argument records and resources compare by
    /// identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Optional(a), Self::Optional(b)) => a == b,
            (Self::Args(a), Self::Args(b)) => Arc::ptr_eq(a, b),
            (Self::Asset(a), Self::Asset(b)) => a == b,
            (Self::Archive(a), Self::Archive(b)) => a == b,
            (Self::Resource(a), Self::Resource(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Opaque { type_name: a }, Self::Opaque { type_name: b }) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Property {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Property {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Property {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Property {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Asset> for Property {
    fn from(a: Asset) -> Self {
        Self::Asset(a)
    }
}

impl From<Archive> for Property {
    fn from(a: Archive) -> Self {
        Self::Archive(a)
    }
}

impl From<AssetOrArchive> for Property {
    fn from(a: AssetOrArchive) -> Self {
        match a {
            AssetOrArchive::Asset(a) => Self::Asset(a),
            AssetOrArchive::Archive(a) => Self::Archive(a),
        }
    }
}

impl From<Resource> for Property {
    fn from(r: Resource) -> Self {
        Self::Resource(r)
    }
}

impl From<Output<Property>> for Property {
    fn from(o: Output<Property>) -> Self {
        Self::Output(o)
    }
}

impl From<Pending> for Property {
    fn from(p: Pending) -> Self {
        Self::Pending(p)
    }
}

impl From<serde_json::Value> for Property {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<Property>> for Property {
    fn from(items: Vec<Property>) -> Self {
        Self::List(items)
    }
}

impl From<IndexMap<String, Property>> for Property {
    fn from(entries: IndexMap<String, Property>) -> Self {
        Self::Map(entries)
    }
}

impl<T: Into<Property>> From<Option<T>> for Property {
    fn from(v: Option<T>) -> Self {
        Self::optional(v.map(Into::into))
    }
}
