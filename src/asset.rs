//! Assets and archives: file-like payloads shipped to the engine by reference.
//!
//! Each variant carries exactly one active payload field; the serializer and
//! deserializer match these enums exhaustively.

use crate::serialization::constants::*;
use indexmap::IndexMap;

/// A single blob of data.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    /// Contents of a local file.
    File(String),
    /// Inline text.
    String(String),
    /// A remote URI (`http(s)://` or `file://`).
    Remote(String),
}

/// A collection of blobs.
#[derive(Debug, Clone, PartialEq)]
pub enum Archive {
    /// A local directory or archive file (tar, tgz, zip, jar).
    File(String),
    /// A remote archive URI.
    Remote(String),
    /// A named set of nested assets and archives.
    Assets(IndexMap<String, AssetOrArchive>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetOrArchive {
    Asset(Asset),
    Archive(Archive),
}

impl Asset {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File(path.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::String(text.into())
    }

    pub fn remote(uri: impl Into<String>) -> Self {
        Self::Remote(uri.into())
    }

    /// Wire field holding the payload.
    pub fn prop_name(&self) -> &'static str {
        match self {
            Self::File(_) => ASSET_OR_ARCHIVE_PATH_NAME,
            Self::String(_) => ASSET_TEXT_NAME,
            Self::Remote(_) => ASSET_OR_ARCHIVE_URI_NAME,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::File(s) | Self::String(s) | Self::Remote(s) => s,
        }
    }
}

impl Archive {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File(path.into())
    }

    pub fn remote(uri: impl Into<String>) -> Self {
        Self::Remote(uri.into())
    }

    pub fn assets<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, AssetOrArchive)>,
        K: Into<String>,
    {
        Self::Assets(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn prop_name(&self) -> &'static str {
        match self {
            Self::File(_) => ASSET_OR_ARCHIVE_PATH_NAME,
            Self::Remote(_) => ASSET_OR_ARCHIVE_URI_NAME,
            Self::Assets(_) => ARCHIVE_ASSETS_NAME,
        }
    }
}

impl AssetOrArchive {
    /// Marker signature identifying this variant on the wire.
    pub fn sig_key(&self) -> &'static str {
        match self {
            Self::Asset(_) => SPECIAL_ASSET_SIG,
            Self::Archive(_) => SPECIAL_ARCHIVE_SIG,
        }
    }

    pub fn prop_name(&self) -> &'static str {
        match self {
            Self::Asset(a) => a.prop_name(),
            Self::Archive(a) => a.prop_name(),
        }
    }
}

impl From<Asset> for AssetOrArchive {
    fn from(a: Asset) -> Self {
        Self::Asset(a)
    }
}

impl From<Archive> for AssetOrArchive {
    fn from(a: Archive) -> Self {
        Self::Archive(a)
    }
}
