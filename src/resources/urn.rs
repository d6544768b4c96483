//! Resource URNs: `urn:pulumi:<stack>::<project>::<qualified-type>::<name>`.
//!
//! The qualified type is a `$`-separated chain of type tokens, parent types
//! first. The trailing token is the resource's own type.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const URN_PREFIX: &str = "urn:pulumi:";
const URN_DELIMITER: &str = "::";
const TYPE_DELIMITER: char = '$';

fn urn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^urn:pulumi:(?P<stack>[^:]+)::(?P<project>[^:]+)::(?P<qtype>[^:$]+(?::[^:$]+)*(?:\$[^:$]+(?::[^:$]+)*)*)::(?P<name>.*)$",
        )
        .expect("URN pattern is valid")
    })
}

/// A parsed URN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn {
    pub stack: String,
    pub project: String,
    pub qualified_type: String,
    pub name: String,
}

impl Urn {
    /// Parse and validate a URN string.
    pub fn parse(urn: &str) -> Result<Self> {
        let caps = urn_regex()
            .captures(urn)
            .ok_or_else(|| Error::InvalidUrn(urn.to_string()))?;
        Ok(Self {
            stack: caps["stack"].to_string(),
            project: caps["project"].to_string(),
            qualified_type: caps["qtype"].to_string(),
            name: caps["name"].to_string(),
        })
    }

    /// Build a URN for a resource, optionally nested under a parent type.
    pub fn create(
        stack: &str,
        project: &str,
        parent_type: Option<&str>,
        type_token: &str,
        name: &str,
    ) -> Self {
        let qualified_type = match parent_type {
            Some(parent) if !parent.is_empty() => {
                format!("{}{}{}", parent, TYPE_DELIMITER, type_token)
            }
            _ => type_token.to_string(),
        };
        Self {
            stack: stack.to_string(),
            project: project.to_string(),
            qualified_type,
            name: name.to_string(),
        }
    }

    /// The resource's own type token (last `$` segment).
    pub fn type_token(&self) -> &str {
        last_type_segment(&self.qualified_type)
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{d}{}{d}{}{d}{}",
            URN_PREFIX,
            self.stack,
            self.project,
            self.qualified_type,
            self.name,
            d = URN_DELIMITER
        )
    }
}

fn last_type_segment(qualified: &str) -> &str {
    qualified.rsplit(TYPE_DELIMITER).next().unwrap_or(qualified)
}

/// Type token of a URN without full validation: the third `::` part, last
/// `$` segment.
pub fn type_token(urn: &str) -> Result<&str> {
    let qualified = urn
        .split(URN_DELIMITER)
        .nth(2)
        .ok_or_else(|| Error::InvalidUrn(urn.to_string()))?;
    Ok(last_type_segment(qualified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_parse_simple() {
        let urn = Urn::parse("urn:pulumi:dev::web::aws:s3/bucket:Bucket::site").unwrap();
        assert_eq!(urn.stack, "dev");
        assert_eq!(urn.project, "web");
        assert_eq!(urn.qualified_type, "aws:s3/bucket:Bucket");
        assert_eq!(urn.name, "site");
        assert_eq!(urn.type_token(), "aws:s3/bucket:Bucket");
    }

    #[test]
    fn test_urn_parse_nested_type() {
        let urn = Urn::parse("urn:pulumi:dev::web::my:index:Site$aws:s3/bucket:Bucket::site-b").unwrap();
        assert_eq!(urn.type_token(), "aws:s3/bucket:Bucket");
        assert_eq!(urn.name, "site-b");
    }

    #[test]
    fn test_urn_name_may_contain_delimiter() {
        let urn = Urn::parse("urn:pulumi:dev::web::pkg:index:Thing::a::b").unwrap();
        assert_eq!(urn.qualified_type, "pkg:index:Thing");
        assert_eq!(urn.name, "a::b");
    }

    #[test]
    fn test_urn_parse_rejects_garbage() {
        assert!(matches!(Urn::parse("not-a-urn"), Err(Error::InvalidUrn(_))));
        assert!(Urn::parse("urn:pulumi:dev::web").is_err());
        assert!(Urn::parse("urn:other:dev::web::t:i:T::n").is_err());
    }

    #[test]
    fn test_urn_create_display_roundtrip() {
        let urn = Urn::create("dev", "web", Some("my:index:Site"), "pkg:index:Thing", "x");
        let text = urn.to_string();
        assert_eq!(text, "urn:pulumi:dev::web::my:index:Site$pkg:index:Thing::x");
        assert_eq!(Urn::parse(&text).unwrap(), urn);
    }

    #[test]
    fn test_urn_type_token_loose() {
        assert_eq!(
            type_token("urn:pulumi:s::p::a:b:C$d:e:F::n").unwrap(),
            "d:e:F"
        );
        assert!(type_token("urn:pulumi:s").is_err());
    }
}
