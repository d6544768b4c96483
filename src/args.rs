//! Argument records: declared resource inputs flattened into string-keyed
//! maps before serialization.

use crate::error::{Error, Result};
use crate::property::Property;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// Declaration of one input attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAttribute {
    /// Wire key.
    pub name: String,
    pub required: bool,
    /// Ship the value as a JSON-encoded string.
    pub json: bool,
}

impl InputAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            json: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// One declared field of an argument record.
#[derive(Debug, Clone)]
pub struct InputInfo {
    /// Field name in the host record, used in error messages.
    pub field: String,
    pub attribute: InputAttribute,
    pub value: Property,
}

/// A record of resource or invoke arguments.
pub trait InputArgs: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    /// Every declared field, in declaration order.
    fn input_infos(&self) -> Vec<InputInfo>;
}

/// Flatten an argument record into `wire key -> value`.
///
/// Output-valued fields are awaited so a required attribute that resolves
/// to a known null is rejected; the original output is kept in the map so
/// its secrecy and dependencies reach the serializer.
pub async fn to_map(args: &dyn InputArgs, ctx: &str) -> Result<IndexMap<String, Property>> {
    let mut map = IndexMap::new();
    for info in args.input_infos() {
        let InputInfo {
            field,
            attribute,
            value,
        } = info;

        if attribute.required {
            let missing = match &value {
                Property::Output(o) => {
                    let data = o.data().await;
                    data.known && data.value.as_ref().is_none_or(Property::is_null)
                }
                other => other.is_null(),
            };
            if missing {
                return Err(Error::MissingRequiredAttribute {
                    attribute: attribute.name,
                    context: format!("{}.{} ({})", ctx, field, args.type_name()),
                });
            }
        }

        let value = if attribute.json {
            json_encoded(value)
        } else {
            value
        };
        map.insert(attribute.name, value);
    }
    Ok(map)
}

fn json_encoded(value: Property) -> Property {
    match value {
        Property::Output(o) => Property::Output(o.convert(json_encoded)),
        other => match other.to_plain_json() {
            Some(serde_json::Value::Null) => Property::Null,
            Some(json) => Property::String(json.to_string()),
            None => other,
        },
    }
}

/// A dynamically-built argument record.
#[derive(Debug, Clone, Default)]
pub struct MapArgs {
    type_name: String,
    entries: IndexMap<String, Property>,
    required: HashSet<String>,
    json: HashSet<String>,
}

impl MapArgs {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Property>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Property>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Mark `key` required; declares it as null if absent.
    pub fn require(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.entries.entry(key.clone()).or_insert(Property::Null);
        self.required.insert(key);
        self
    }

    pub fn json_encode(mut self, key: impl Into<String>) -> Self {
        self.json.insert(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> IndexMap<String, Property> {
        self.entries
    }
}

impl InputArgs for MapArgs {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn input_infos(&self) -> Vec<InputInfo> {
        self.entries
            .iter()
            .map(|(key, value)| InputInfo {
                field: key.clone(),
                attribute: InputAttribute {
                    name: key.clone(),
                    required: self.required.contains(key),
                    json: self.json.contains(key),
                },
                value: value.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Output;

    #[derive(Debug)]
    struct BucketArgs {
        name: Option<Output<Property>>,
        policy: serde_json::Value,
    }

    impl InputArgs for BucketArgs {
        fn type_name(&self) -> &str {
            "BucketArgs"
        }

        fn input_infos(&self) -> Vec<InputInfo> {
            vec![
                InputInfo {
                    field: "name".into(),
                    attribute: InputAttribute::new("bucketName").required(),
                    value: self.name.clone().map(Property::Output).into(),
                },
                InputInfo {
                    field: "policy".into(),
                    attribute: InputAttribute::new("policy").json(),
                    value: Property::Json(self.policy.clone()),
                },
            ]
        }
    }

    #[tokio::test]
    async fn test_args_to_map_uses_wire_keys() {
        let args = BucketArgs {
            name: Some(Output::new(Property::from("logs"))),
            policy: serde_json::json!({"Version": "2012"}),
        };
        let map = to_map(&args, "bucket").await.unwrap();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["bucketName", "policy"]);
        assert_eq!(
            map["policy"],
            Property::String(r#"{"Version":"2012"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_args_missing_required_known_null() {
        let args = BucketArgs {
            name: Some(Output::empty()),
            policy: serde_json::Value::Null,
        };
        let err = to_map(&args, "bucket").await.unwrap_err();
        match err {
            Error::MissingRequiredAttribute { attribute, context } => {
                assert_eq!(attribute, "bucketName");
                assert!(context.contains("BucketArgs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_args_required_unknown_is_allowed() {
        let args = BucketArgs {
            name: Some(Output::unknown()),
            policy: serde_json::Value::Null,
        };
        let map = to_map(&args, "bucket").await.unwrap();
        assert!(matches!(map["bucketName"], Property::Output(_)));
        assert_eq!(map["policy"], Property::Null);
    }

    #[tokio::test]
    async fn test_args_required_plain_absent() {
        let args = BucketArgs {
            name: None,
            policy: serde_json::Value::Null,
        };
        assert!(matches!(
            to_map(&args, "bucket").await,
            Err(Error::MissingRequiredAttribute { .. })
        ));
    }

    #[tokio::test]
    async fn test_map_args_required_and_json() {
        let args = MapArgs::new("Thing")
            .with("size", 3.0)
            .with("tags", Property::map([("env", Property::from("dev"))]))
            .json_encode("tags")
            .require("owner");
        assert!(to_map(&args, "thing").await.is_err());

        let args = args.with("owner", "ops");
        let map = to_map(&args, "thing").await.unwrap();
        assert_eq!(map["tags"], Property::String(r#"{"env":"dev"}"#.into()));
        assert_eq!(map["owner"], Property::from("ops"));
    }
}
