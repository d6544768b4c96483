//! Property graph -> wire value.
//!
//! The serializer walks a live [`Property`] graph, awaiting every output it
//! meets, and records each resource the graph touched. One instance serves
//! one call; its resource set is not shared.

use super::constants::*;
use super::wire::{Struct, Value};
use crate::args;
use crate::asset::{Archive, Asset};
use crate::error::{Error, Result};
use crate::output::ResourceSet;
use crate::property::Property;
use crate::resources::Resource;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Serializer {
    dependent_resources: ResourceSet,
    excessive_debug_output: bool,
}

impl Serializer {
    pub fn new(excessive_debug_output: bool) -> Self {
        Self {
            dependent_resources: ResourceSet::new(),
            excessive_debug_output,
        }
    }

    /// Every resource touched so far.
    pub fn dependent_resources(&self) -> &ResourceSet {
        &self.dependent_resources
    }

    pub fn into_dependent_resources(self) -> ResourceSet {
        self.dependent_resources
    }

    fn trace(&self, ctx: &str, what: &str) {
        if self.excessive_debug_output {
            debug!("Serialize property[{}]: {}", ctx, what);
        }
    }

    /// Serialize `prop` under the diagnostic path `ctx`.
    ///
    /// With `keep_resources` resource handles become reference markers;
    /// otherwise a custom resource is sent as its id and a component as its
    /// URN.
    pub fn serialize<'a>(
        &'a mut self,
        ctx: &'a str,
        prop: &'a Property,
        keep_resources: bool,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match prop {
                Property::Null => Ok(Value::Null),
                Property::Bool(b) => Ok(Value::Bool(*b)),
                Property::Number(n) if !n.is_finite() => Err(Error::UnsupportedType {
                    type_name: format!("non-finite number {}", n),
                    context: ctx.to_string(),
                }),
                Property::Number(n) => Ok(Value::Number(*n)),
                Property::String(s) => {
                    self.trace(ctx, "primitive");
                    Ok(Value::String(s.clone()))
                }
                Property::Optional(None) => Ok(Value::Null),
                Property::Optional(Some(inner)) => {
                    self.trace(ctx, "recursing into optional");
                    self.serialize(ctx, inner, keep_resources).await
                }
                Property::Args(record) => {
                    self.trace(ctx, "recursing into argument record");
                    let map = args::to_map(record.as_ref(), ctx).await?;
                    self.serialize_map(ctx, &map, keep_resources).await
                }
                Property::Asset(asset) => self.serialize_asset(ctx, asset, keep_resources).await,
                Property::Archive(archive) => {
                    self.serialize_archive(ctx, archive, keep_resources).await
                }
                Property::Pending(_) => Err(Error::LeakedPendingComputation(ctx.to_string())),
                Property::Output(output) => {
                    self.trace(ctx, "recursing into output");
                    let data = output.data().await;
                    self.dependent_resources.extend(data.resources);
                    if !data.known {
                        return Ok(Value::unknown());
                    }
                    let inner_ctx = format!("{}.id", ctx);
                    let value = match &data.value {
                        Some(value) => self.serialize(&inner_ctx, value, keep_resources).await?,
                        None => Value::Null,
                    };
                    Ok(if data.secret {
                        Value::secret(value)
                    } else {
                        value
                    })
                }
                Property::Resource(resource) => {
                    self.serialize_resource(ctx, resource, keep_resources).await
                }
                Property::Json(json) => {
                    self.trace(ctx, "recursing into JSON document");
                    serialize_json(ctx, json)
                }
                Property::List(items) => {
                    self.trace(ctx, "hit list");
                    let mut result = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_ctx = format!("{}[{}]", ctx, i);
                        result.push(self.serialize(&item_ctx, item, keep_resources).await?);
                    }
                    Ok(Value::List(result))
                }
                Property::Map(entries) => self.serialize_map(ctx, entries, keep_resources).await,
                Property::Opaque { type_name } => Err(Error::UnsupportedType {
                    type_name: type_name.clone(),
                    context: ctx.to_string(),
                }),
            }
        })
    }

    /// Null-valued entries are omitted.
    async fn serialize_map(
        &mut self,
        ctx: &str,
        entries: &IndexMap<String, Property>,
        keep_resources: bool,
    ) -> Result<Value> {
        self.trace(ctx, "hit map");
        let mut fields = Struct::new();
        for (key, value) in entries {
            let entry_ctx = format!("{}.{}", ctx, key);
            let value = self.serialize(&entry_ctx, value, keep_resources).await?;
            if !value.is_null() {
                fields.insert(key.clone(), value);
            }
        }
        Ok(Value::Struct(fields))
    }

    async fn serialize_asset(&mut self, ctx: &str, asset: &Asset, keep: bool) -> Result<Value> {
        self.trace(ctx, "asset");
        let field = asset.prop_name();
        let payload = Property::String(asset.payload().to_string());
        let value = self
            .serialize(&format!("{}.{}", ctx, field), &payload, keep)
            .await?;
        Ok(Value::marker(SPECIAL_ASSET_SIG, [(field, value)]))
    }

    async fn serialize_archive(&mut self, ctx: &str, archive: &Archive, keep: bool) -> Result<Value> {
        self.trace(ctx, "archive");
        let field = archive.prop_name();
        let payload = match archive {
            Archive::File(s) | Archive::Remote(s) => Property::String(s.clone()),
            Archive::Assets(entries) => Property::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Property::from(v.clone())))
                    .collect(),
            ),
        };
        let value = self
            .serialize(&format!("{}.{}", ctx, field), &payload, keep)
            .await?;
        Ok(Value::marker(SPECIAL_ARCHIVE_SIG, [(field, value)]))
    }

    async fn serialize_resource(
        &mut self,
        ctx: &str,
        resource: &Resource,
        keep_resources: bool,
    ) -> Result<Value> {
        let urn = Property::Output(resource.raw_urn().convert(Property::String));

        if !resource.is_custom() {
            // Components are sent by URN only; walking their fields could
            // wait on children that are waiting on the component.
            self.trace(ctx, "component resource");
            let urn = self
                .serialize(&format!("{}.urn", ctx), &urn, keep_resources)
                .await?;
            return Ok(if keep_resources {
                Value::marker(SPECIAL_RESOURCE_SIG, [(RESOURCE_URN_NAME, urn)])
            } else {
                urn
            });
        }

        self.trace(ctx, "custom resource");
        self.dependent_resources.insert(resource.clone());
        let id = match resource.raw_id() {
            Some(id) => Property::Output(id.convert(Property::String)),
            None => Property::Null,
        };
        let id = self
            .serialize(&format!("{}.id", ctx), &id, keep_resources)
            .await?;
        if !keep_resources {
            return Ok(id);
        }
        let urn = self
            .serialize(&format!("{}.urn", ctx), &urn, keep_resources)
            .await?;
        let id = if id.is_unknown() {
            Value::from("")
        } else {
            id
        };
        Ok(Value::marker(
            SPECIAL_RESOURCE_SIG,
            [(RESOURCE_URN_NAME, urn), (RESOURCE_ID_NAME, id)],
        ))
    }
}

/// Structural mapping of a JSON document. Unlike maps, JSON objects keep
/// their null members.
pub fn serialize_json(ctx: &str, json: &serde_json::Value) -> Result<Value> {
    use serde_json::Value as J;
    Ok(match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(*b),
        J::Number(n) => Value::Number(n.as_f64().ok_or_else(|| Error::UnsupportedType {
            type_name: format!("JSON number {}", n),
            context: ctx.to_string(),
        })?),
        J::String(s) => Value::String(s.clone()),
        J::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| serialize_json(&format!("{}[{}]", ctx, i), item))
                .collect::<Result<_>>()?,
        ),
        J::Object(fields) => Value::Struct(
            fields
                .iter()
                .map(|(k, v)| serialize_json(&format!("{}.{}", ctx, k), v).map(|v| (k.clone(), v)))
                .collect::<Result<_>>()?,
        ),
    })
}
