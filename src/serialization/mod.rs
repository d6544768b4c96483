//! Wire codec: property graphs to engine values and back.

pub mod constants;
pub mod deserializer;
pub mod serializer;
pub mod wire;

pub use deserializer::{deserialize, Deserializer};
pub use serializer::Serializer;
pub use wire::{Struct, Value};

use crate::error::Result;
use crate::output::ResourceSet;
use crate::property::Property;

/// Serialize one property graph with a fresh serializer, returning the wire
/// value and every resource it touched.
pub async fn serialize(
    ctx: &str,
    prop: &Property,
    keep_resources: bool,
) -> Result<(Value, ResourceSet)> {
    let mut serializer = Serializer::new(false);
    let value = serializer.serialize(ctx, prop, keep_resources).await?;
    Ok((value, serializer.into_dependent_resources()))
}

#[cfg(test)]
mod tests {
    use super::constants::*;
    use super::*;
    use crate::asset::{Archive, Asset};
    use crate::output::{Output, OutputData};
    use proptest::prelude::*;

    async fn through_wire(prop: Property) -> OutputData<Property> {
        let (value, _) = serialize("prop", &prop, true).await.unwrap();
        let json = value.to_json().unwrap();
        deserialize(&Value::from_json(&json).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_number() {
        let (value, _) = serialize("n", &Property::Output(Output::new(Property::from(1.0))), false)
            .await
            .unwrap();
        assert_eq!(value, Value::Number(1.0));
        let data = deserialize(&value).unwrap();
        assert_eq!(data.value, Some(Property::Number(1.0)));
        assert!(data.known && !data.secret);
    }

    #[tokio::test]
    async fn test_scenario_secret() {
        let (value, _) = serialize("s", &Property::Output(Output::secret(Property::from("x"))), false)
            .await
            .unwrap();
        let fields = value.as_struct().unwrap();
        assert_eq!(fields[SPECIAL_SIG_KEY], Value::from(SPECIAL_SECRET_SIG));
        assert_eq!(fields[SECRET_VALUE_NAME], Value::from("x"));
        let data = deserialize(&value).unwrap();
        assert_eq!(data.value, Some(Property::from("x")));
        assert!(data.known && data.secret);
    }

    #[tokio::test]
    async fn test_scenario_unknown() {
        let (value, _) = serialize("u", &Property::Output(Output::unknown()), false)
            .await
            .unwrap();
        assert_eq!(value, Value::from(UNKNOWN_VALUE));
        let data = deserialize(&value).unwrap();
        assert!(data.value.is_none());
        assert!(!data.known);
    }

    #[tokio::test]
    async fn test_scenario_null_entry_dropped() {
        let prop = Property::map([("a", Property::Null), ("b", Property::from(2.0))]);
        let (value, _) = serialize("m", &prop, false).await.unwrap();
        assert_eq!(value.to_json().unwrap(), serde_json::json!({"b": 2.0}));
        let data = deserialize(&value).unwrap();
        assert_eq!(data.value, Some(Property::map([("b", Property::from(2.0))])));
    }

    #[test]
    fn test_scenario_internal_keys() {
        let json = serde_json::json!({"__provider": "urn:x", "name": "n"});
        let data = deserialize(&Value::from_json(&json).unwrap()).unwrap();
        assert_eq!(data.value, Some(Property::map([("name", Property::from("n"))])));
    }

    #[tokio::test]
    async fn test_roundtrip_nested_payload() {
        let prop = Property::map([
            ("count", Property::from(3.0)),
            ("tags", Property::List(vec![Property::from("a"), Property::from("b")])),
            ("site", Property::from(Archive::file("./www"))),
            ("readme", Property::from(Asset::text("# hi"))),
        ]);
        let data = through_wire(prop.clone()).await;
        assert!(data.known && !data.secret);
        assert_eq!(data.value, Some(prop));
    }

    #[tokio::test]
    async fn test_roundtrip_secret_inside_map_marks_whole() {
        let prop = Property::map([
            ("user", Property::from("admin")),
            ("pass", Property::Output(Output::secret(Property::from("pw")))),
        ]);
        let data = through_wire(prop).await;
        assert!(data.secret);
        assert_eq!(
            data.value.unwrap().as_map().unwrap()["pass"],
            Property::from("pw")
        );
    }

    fn leaf() -> impl Strategy<Value = Property> {
        prop_oneof![
            any::<bool>().prop_map(Property::Bool),
            (-1.0e9..1.0e9f64).prop_map(Property::Number),
            "[a-zA-Z0-9 ._/-]{0,16}".prop_map(Property::String),
            "[a-z]{1,8}".prop_map(|t| Property::from(Asset::text(t))),
            "[a-z/]{1,12}".prop_map(|p| Property::from(Asset::file(p))),
            "[a-z]{1,8}".prop_map(|h| Property::from(Asset::remote(format!("https://{}.test/a", h)))),
            "[a-z/]{1,12}".prop_map(|p| Property::from(Archive::file(p))),
        ]
    }

    fn tree() -> impl Strategy<Value = Property> {
        leaf().prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Property::List),
                proptest::collection::btree_map("[a-z][a-z0-9_]{0,8}", inner, 0..6)
                    .prop_map(|entries| Property::Map(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_plain_payload_survives_wire(prop in tree()) {
            let data = futures::executor::block_on(through_wire(prop.clone()));
            prop_assert!(data.known);
            prop_assert!(!data.secret);
            prop_assert_eq!(data.value, Some(prop));
        }
    }
}
