//! Program file parsing and validation.
//!
//! Parses strata.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Type tokens must have the `<package>:<module>:<type>` shape
//! - depends_on, parent, provider and `${...}` references must exist
//! - `fn::*` property functions must be known and well-formed

use super::resolver;
use super::types::*;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a strata.yaml file from disk.
pub fn parse_program_file(path: &Path) -> Result<ProgramConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_program(&content)
}

/// Parse a strata.yaml from a string.
pub fn parse_program(yaml: &str) -> Result<ProgramConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// `<package>:<module>:<type>` with every part non-empty.
pub fn is_valid_type_token(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty())
}

/// Validate a parsed program. Returns a list of errors (empty = valid).
pub fn validate_program(config: &ProgramConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError::new(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        )));
    }

    if config.name.is_empty() {
        errors.push(ValidationError::new("name must not be empty"));
    }

    for (id, resource) in &config.resources {
        if !is_valid_type_token(&resource.type_token) {
            errors.push(ValidationError::new(format!(
                "resource '{}' has invalid type token '{}'",
                id, resource.type_token
            )));
        }

        for dep in &resource.depends_on {
            check_reference(config, id, dep, "depends on", &mut errors);
        }
        if let Some(parent) = &resource.parent {
            check_reference(config, id, parent, "has parent", &mut errors);
            if let Some(decl) = config.resources.get(parent) {
                if !decl.component {
                    errors.push(ValidationError::new(format!(
                        "resource '{}' has parent '{}' which is not a component",
                        id, parent
                    )));
                }
            }
        }
        if let Some(provider) = &resource.provider {
            check_reference(config, id, provider, "uses provider", &mut errors);
        }

        for (key, value) in &resource.properties {
            let ctx = format!("resource '{}' property '{}'", id, key);
            validate_value(config, &ctx, Some(id), value, &mut errors);
        }
    }

    for (key, value) in &config.outputs {
        let ctx = format!("output '{}'", key);
        validate_value(config, &ctx, None, value, &mut errors);
    }

    errors
}

fn check_reference(
    config: &ProgramConfig,
    id: &str,
    target: &str,
    relation: &str,
    errors: &mut Vec<ValidationError>,
) {
    if target == id {
        errors.push(ValidationError::new(format!(
            "resource '{}' {} itself",
            id, relation
        )));
    } else if !config.resources.contains_key(target) {
        errors.push(ValidationError::new(format!(
            "resource '{}' {} unknown resource '{}'",
            id, relation, target
        )));
    }
}

fn validate_value(
    config: &ProgramConfig,
    ctx: &str,
    owner: Option<&str>,
    value: &serde_yaml_ng::Value,
    errors: &mut Vec<ValidationError>,
) {
    use serde_yaml_ng::Value as Y;

    if let Some((key, arg)) = as_function_call(value) {
        validate_function(config, ctx, owner, key, arg, errors);
        return;
    }
    match value {
        Y::String(s) => match resolver::parse_template(s) {
            Ok(segments) => {
                for segment in segments {
                    let Segment::Reference(r) = segment else {
                        continue;
                    };
                    if owner == Some(r.resource.as_str()) {
                        errors.push(ValidationError::new(format!(
                            "{} references its own resource in '{}'",
                            ctx, r
                        )));
                    } else if !config.resources.contains_key(&r.resource) {
                        errors.push(ValidationError::new(format!(
                            "{} references unknown resource '{}'",
                            ctx, r.resource
                        )));
                    }
                }
            }
            Err(e) => errors.push(ValidationError::new(format!("{}: {}", ctx, e))),
        },
        Y::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                validate_value(config, &format!("{}[{}]", ctx, i), owner, item, errors);
            }
        }
        Y::Mapping(entries) => {
            for (k, item) in entries {
                let k = k.as_str().unwrap_or("?");
                validate_value(config, &format!("{}.{}", ctx, k), owner, item, errors);
            }
        }
        Y::Tagged(tagged) => validate_value(config, ctx, owner, &tagged.value, errors),
        Y::Null | Y::Bool(_) | Y::Number(_) => {}
    }
}

fn validate_function(
    config: &ProgramConfig,
    ctx: &str,
    owner: Option<&str>,
    key: &str,
    arg: &serde_yaml_ng::Value,
    errors: &mut Vec<ValidationError>,
) {
    let Some(function) = PropertyFn::from_key(key) else {
        errors.push(ValidationError::new(format!(
            "{} uses unknown function '{}'",
            ctx, key
        )));
        return;
    };
    let ctx = format!("{} ({})", ctx, function);
    match function {
        PropertyFn::Secret => validate_value(config, &ctx, owner, arg, errors),
        PropertyFn::Asset => {
            if single_string_field(arg, &["text", "path", "uri"]).is_none() {
                errors.push(ValidationError::new(format!(
                    "{} needs exactly one of text, path or uri",
                    ctx
                )));
            }
        }
        PropertyFn::Archive => {
            let assets = arg.as_mapping().and_then(|m| m.get("assets"));
            match assets {
                Some(assets) => match assets.as_mapping() {
                    Some(entries) => {
                        for (name, entry) in entries {
                            let name = name.as_str().unwrap_or("?");
                            let entry_ctx = format!("{}.assets.{}", ctx, name);
                            match as_function_call(entry) {
                                Some((k, a)) if k == "fn::asset" || k == "fn::archive" => {
                                    validate_function(config, &entry_ctx, owner, k, a, errors)
                                }
                                _ => errors.push(ValidationError::new(format!(
                                    "{} must be an fn::asset or fn::archive",
                                    entry_ctx
                                ))),
                            }
                        }
                    }
                    None => errors.push(ValidationError::new(format!(
                        "{} assets must be a mapping",
                        ctx
                    ))),
                },
                None => {
                    if single_string_field(arg, &["path", "uri"]).is_none() {
                        errors.push(ValidationError::new(format!(
                            "{} needs exactly one of path, uri or assets",
                            ctx
                        )));
                    }
                }
            }
        }
        PropertyFn::Invoke => {
            let Some(mapping) = arg.as_mapping() else {
                errors.push(ValidationError::new(format!("{} must be a mapping", ctx)));
                return;
            };
            match mapping.get("function").and_then(|f| f.as_str()) {
                Some(token) if is_valid_type_token(token) => {}
                Some(token) => errors.push(ValidationError::new(format!(
                    "{} has invalid function token '{}'",
                    ctx, token
                ))),
                None => errors.push(ValidationError::new(format!(
                    "{} has no function",
                    ctx
                ))),
            }
            if let Some(arguments) = mapping.get("arguments") {
                validate_value(config, &ctx, owner, arguments, errors);
            }
        }
    }
}

/// The `(field, value)` pair of a mapping holding exactly one of `fields`
/// as a string.
pub(crate) fn single_string_field<'a>(
    value: &'a serde_yaml_ng::Value,
    fields: &[&'static str],
) -> Option<(&'static str, &'a str)> {
    let mapping = value.as_mapping()?;
    let mut found = fields
        .iter()
        .filter_map(|f| mapping.get(*f).map(|v| (*f, v)));
    let (field, v) = found.next()?;
    if found.next().is_some() || mapping.len() != 1 {
        return None;
    }
    Some((field, v.as_str()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(yaml: &str) -> Vec<String> {
        let config = parse_program(yaml).unwrap();
        validate_program(&config)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_parse_valid_program() {
        let yaml = r#"
version: "1.0"
name: site
resources:
  bucket:
    type: aws:s3/bucket:Bucket
    properties:
      acl: private
      tags: {team: web}
  index:
    type: aws:s3/object:Object
    properties:
      bucket: "${bucket.id}"
      source: {fn::asset: {text: "<h1>hi</h1>"}}
      password: {fn::secret: hunter2}
  site:
    type: my:index:Site
    component: true
outputs:
  url: "https://${bucket.websiteEndpoint}"
"#;
        let errors = errors_for(yaml);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_bad_version_and_name() {
        let errors = errors_for("version: \"2.0\"\nname: \"\"\n");
        assert!(errors.iter().any(|e| e.contains("version")));
        assert!(errors.iter().any(|e| e.contains("name must not be empty")));
    }

    #[test]
    fn test_invalid_type_token() {
        let errors = errors_for(
            r#"
version: "1.0"
name: t
resources:
  a:
    type: Bucket
"#,
        );
        assert!(errors.iter().any(|e| e.contains("invalid type token")));
        assert!(is_valid_type_token("aws:s3/bucket:Bucket"));
        assert!(!is_valid_type_token("aws::Bucket"));
    }

    #[test]
    fn test_unknown_references() {
        let errors = errors_for(
            r#"
version: "1.0"
name: t
resources:
  a:
    type: pkg:index:Thing
    depends_on: [ghost]
    parent: phantom
    properties:
      x: "${spook.value}"
outputs:
  y: "${nobody}"
"#,
        );
        assert!(errors.iter().any(|e| e.contains("depends on unknown resource 'ghost'")));
        assert!(errors.iter().any(|e| e.contains("has parent unknown resource 'phantom'")));
        assert!(errors.iter().any(|e| e.contains("references unknown resource 'spook'")));
        assert!(errors.iter().any(|e| e.contains("output 'y' references unknown resource 'nobody'")));
    }

    #[test]
    fn test_self_reference() {
        let errors = errors_for(
            r#"
version: "1.0"
name: t
resources:
  a:
    type: pkg:index:Thing
    depends_on: [a]
    properties:
      x: "${a.y}"
"#,
        );
        assert!(errors.iter().any(|e| e.contains("depends on itself")));
        assert!(errors.iter().any(|e| e.contains("references its own resource")));
    }

    #[test]
    fn test_parent_must_be_component() {
        let errors = errors_for(
            r#"
version: "1.0"
name: t
resources:
  a:
    type: pkg:index:Thing
  b:
    type: pkg:index:Thing
    parent: a
"#,
        );
        assert!(errors.iter().any(|e| e.contains("not a component")));
    }

    #[test]
    fn test_function_validation() {
        let errors = errors_for(
            r#"
version: "1.0"
name: t
resources:
  a:
    type: pkg:index:Thing
    properties:
      p: {fn::nope: 1}
      q: {fn::asset: {text: a, path: b}}
      r: {fn::archive: {assets: {x: plain}}}
      s: {fn::invoke: {arguments: {}}}
      u: "${a"
"#,
        );
        assert!(errors.iter().any(|e| e.contains("unknown function 'fn::nope'")));
        assert!(errors.iter().any(|e| e.contains("exactly one of text, path or uri")));
        assert!(errors.iter().any(|e| e.contains("must be an fn::asset or fn::archive")));
        assert!(errors.iter().any(|e| e.contains("has no function")));
        assert!(errors.iter().any(|e| e.contains("unclosed interpolation")));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.yaml");
        std::fs::write(
            &path,
            r#"
version: "1.0"
name: file-test
"#,
        )
        .unwrap();
        let config = parse_program_file(&path).unwrap();
        assert_eq!(config.name, "file-test");
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(parse_program("not: [valid: yaml: {{").is_err());
        assert!(parse_program_file(Path::new("/nonexistent/strata.yaml")).is_err());
    }
}
