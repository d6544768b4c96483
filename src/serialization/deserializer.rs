//! Wire value -> property graph.
//!
//! The inverse of the serializer: secret markers become the secret flag,
//! the unknown sentinel becomes an unknown record, and asset, archive and
//! resource markers become their concrete variants.

use super::constants::*;
use super::wire::{Struct, Value};
use crate::asset::{Archive, Asset, AssetOrArchive};
use crate::error::{Error, Result};
use crate::output::{Accumulator, OutputData};
use crate::property::Property;
use crate::resources::{urn, Resource, ResourcePackages};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct Deserializer<'a> {
    packages: Option<&'a ResourcePackages>,
}

/// Deserialize without a resource registry; references become dependency
/// resources.
pub fn deserialize(value: &Value) -> Result<OutputData<Property>> {
    Deserializer::new().deserialize(value)
}

impl<'a> Deserializer<'a> {
    pub fn new() -> Self {
        Self { packages: None }
    }

    /// Resource references are constructed through `packages` when their
    /// type is registered.
    pub fn with_packages(packages: &'a ResourcePackages) -> Self {
        Self {
            packages: Some(packages),
        }
    }

    pub fn deserialize(&self, value: &Value) -> Result<OutputData<Property>> {
        let (value, secret) = unwrap_secret(value)?;

        if value.is_unknown() {
            return Ok(OutputData::unknown().with_secret(secret));
        }
        if let Some(asset_or_archive) = try_deserialize_asset_or_archive(value)? {
            return Ok(OutputData::known(Property::from(asset_or_archive)).with_secret(secret));
        }
        if let Some(resource) = self.try_deserialize_resource(value)? {
            return Ok(OutputData::known(Property::Resource(resource)).with_secret(secret));
        }

        let data = match value {
            Value::Null => OutputData::empty(),
            Value::Bool(b) => OutputData::known(Property::Bool(*b)),
            Value::Number(n) => OutputData::known(Property::Number(*n)),
            Value::String(s) => OutputData::known(Property::String(s.clone())),
            Value::List(items) => self.deserialize_list(items)?,
            Value::Struct(fields) => self.deserialize_struct(fields)?,
        };
        let secret = secret || data.secret;
        Ok(data.with_secret(secret))
    }

    fn deserialize_list(&self, items: &[Value]) -> Result<OutputData<Property>> {
        let mut acc = Accumulator::new();
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let data = self.deserialize(item)?;
            result.push(acc.take(data).unwrap_or(Property::Null));
        }
        Ok(acc.finish(Some(Property::List(result))))
    }

    /// Engine-internal keys (`__` prefix) are dropped.
    fn deserialize_struct(&self, fields: &Struct) -> Result<OutputData<Property>> {
        let mut acc = Accumulator::new();
        let mut result = indexmap::IndexMap::with_capacity(fields.len());
        for (key, value) in fields {
            if key.starts_with(INTERNAL_KEY_PREFIX) {
                continue;
            }
            let data = self.deserialize(value)?;
            result.insert(key.clone(), acc.take(data).unwrap_or(Property::Null));
        }
        Ok(acc.finish(Some(Property::Map(result))))
    }

    fn try_deserialize_resource(&self, value: &Value) -> Result<Option<Resource>> {
        if value.signature() != Some(SPECIAL_RESOURCE_SIG) {
            return Ok(None);
        }
        let fields = value
            .as_struct()
            .ok_or_else(|| Error::MalformedWire("resource marker is not a struct".into()))?;
        let urn = string_field(fields, RESOURCE_URN_NAME).ok_or_else(|| {
            Error::MalformedWire(
                "value was marked as a resource, but did not conform to required shape".into(),
            )
        })?;
        let version = string_field(fields, RESOURCE_VERSION_NAME);
        let id = string_field(fields, RESOURCE_ID_NAME).filter(|id| !id.is_empty());
        let type_token = urn::type_token(urn)
            .map_err(|_| Error::MalformedWire(format!("resource reference has a bad URN '{}'", urn)))?;

        if let Some(packages) = self.packages {
            if let Some(resource) = packages.try_construct(type_token, version, urn, id) {
                debug!("Rehydrated {} reference {}", type_token, urn);
                return Ok(Some(resource));
            }
            warn!(
                "No resource package registered for '{}', using a dependency reference",
                type_token
            );
        }
        Ok(Some(Resource::from_urn(
            crate::resources::ResourceKind::Dependency,
            urn,
            id.map(str::to_string),
        )))
    }
}

/// Strip nested secret markers; any layer makes the result secret.
fn unwrap_secret(value: &Value) -> Result<(&Value, bool)> {
    let mut value = value;
    let mut secret = false;
    while value.signature() == Some(SPECIAL_SECRET_SIG) {
        value = value
            .as_struct()
            .and_then(|fields| fields.get(SECRET_VALUE_NAME))
            .ok_or_else(|| {
                Error::MalformedWire("secrets must have a field called 'value'".into())
            })?;
        secret = true;
    }
    Ok((value, secret))
}

fn string_field<'v>(fields: &'v Struct, name: &str) -> Option<&'v str> {
    fields.get(name).and_then(Value::as_str)
}

fn try_deserialize_asset_or_archive(value: &Value) -> Result<Option<AssetOrArchive>> {
    match value.signature() {
        Some(SPECIAL_ASSET_SIG) => deserialize_asset(value).map(|a| Some(a.into())),
        Some(SPECIAL_ARCHIVE_SIG) => deserialize_archive(value).map(|a| Some(a.into())),
        _ => Ok(None),
    }
}

fn marker_fields(value: &Value) -> Result<&Struct> {
    value
        .as_struct()
        .ok_or_else(|| Error::MalformedWire(format!("expected struct, got {}", value.kind())))
}

/// Field precedence: path, uri, text.
fn deserialize_asset(value: &Value) -> Result<Asset> {
    let fields = marker_fields(value)?;
    if let Some(path) = string_field(fields, ASSET_OR_ARCHIVE_PATH_NAME) {
        return Ok(Asset::file(path));
    }
    if let Some(uri) = string_field(fields, ASSET_OR_ARCHIVE_URI_NAME) {
        return Ok(Asset::remote(uri));
    }
    if let Some(text) = string_field(fields, ASSET_TEXT_NAME) {
        return Ok(Asset::text(text));
    }
    Err(Error::MalformedWire(
        "value was marked as an asset, but did not conform to required shape".into(),
    ))
}

/// Field precedence: path, uri, assets.
fn deserialize_archive(value: &Value) -> Result<Archive> {
    let fields = marker_fields(value)?;
    if let Some(path) = string_field(fields, ASSET_OR_ARCHIVE_PATH_NAME) {
        return Ok(Archive::file(path));
    }
    if let Some(uri) = string_field(fields, ASSET_OR_ARCHIVE_URI_NAME) {
        return Ok(Archive::remote(uri));
    }
    if let Some(assets) = fields.get(ARCHIVE_ASSETS_NAME).and_then(Value::as_struct) {
        let entries = assets
            .iter()
            .map(|(name, entry)| {
                try_deserialize_asset_or_archive(entry)?
                    .map(|a| (name.clone(), a))
                    .ok_or_else(|| {
                        Error::MalformedWire(format!(
                            "archive entry '{}' is not itself an asset or archive",
                            name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Archive::assets(entries));
    }
    Err(Error::MalformedWire(
        "value was marked as an archive, but did not conform to required shape".into(),
    ))
}
