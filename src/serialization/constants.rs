//! Wire constants shared with every sibling SDK. These values are part of the
//! engine protocol and must never change.

/// Unknown values are encoded as this distinguished string.
pub const UNKNOWN_VALUE: &str = "04da6b54-80e4-46f7-96ec-b56ff0331ba9";

/// Key holding the marker signature inside a struct.
pub const SPECIAL_SIG_KEY: &str = "4dabf18193072939515e22adb298388d";

pub const SPECIAL_ASSET_SIG: &str = "c44067f5952c0a294b673a41bacd8c17";
pub const SPECIAL_ARCHIVE_SIG: &str = "0def7320c3a5731c473e5ecbe6d01bc7";
pub const SPECIAL_SECRET_SIG: &str = "1b47061264138c4ac30d75fd1eb44270";
pub const SPECIAL_RESOURCE_SIG: &str = "5cf8f73096256a8f31e491e813e4eb8e";

pub const SECRET_VALUE_NAME: &str = "value";

pub const ASSET_TEXT_NAME: &str = "text";
pub const ARCHIVE_ASSETS_NAME: &str = "assets";
pub const ASSET_OR_ARCHIVE_PATH_NAME: &str = "path";
pub const ASSET_OR_ARCHIVE_URI_NAME: &str = "uri";

pub const RESOURCE_URN_NAME: &str = "urn";
pub const RESOURCE_ID_NAME: &str = "id";
pub const RESOURCE_VERSION_NAME: &str = "packageVersion";

/// Property names the engine owns; never sent as resource inputs.
pub const ID_PROPERTY_NAME: &str = "id";
pub const URN_PROPERTY_NAME: &str = "urn";

/// Prefix of engine-internal struct keys, dropped on deserialize.
pub const INTERNAL_KEY_PREFIX: &str = "__";

/// Monitor feature gating resource reference markers.
pub const FEATURE_RESOURCE_REFERENCES: &str = "resourceReferences";
