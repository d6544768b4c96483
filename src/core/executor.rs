//! Program executor: evaluates declarations into property graphs and
//! registers them against a deployment.
//!
//! parse → validate → DAG → for each resource: evaluate → register;
//! then stack outputs → wait for the run loop → summary

use super::parser::single_string_field;
use super::resolver;
use super::types::*;
use crate::asset::{Archive, Asset, AssetOrArchive};
use crate::deployment::{Deployment, InvokeOptions};
use crate::error::{Error, Result};
use crate::output::{Output, OutputData};
use crate::property::Property;
use crate::resources::{Resource, ResourceOptions};
use crate::serialization;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_yaml_ng::Value as Y;
use tracing::{debug, info};

/// Type token of the root component holding stack outputs.
pub const STACK_TYPE: &str = "pulumi:pulumi:Stack";

const UNKNOWN_DISPLAY: &str = "[unknown]";
const SECRET_DISPLAY: &str = "[secret]";

fn program_error(ctx: &str, message: impl std::fmt::Display) -> Error {
    Error::Program(format!("{}: {}", ctx, message))
}

/// Evaluation scope: the deployment and every resource declared so far.
struct Scope<'a> {
    deployment: &'a Deployment,
    resources: &'a IndexMap<String, Resource>,
}

impl<'a> Scope<'a> {
    fn evaluate<'s>(&'s self, ctx: &'s str, value: &'s Y) -> BoxFuture<'s, Result<Property>> {
        async move {
            if let Some((key, arg)) = as_function_call(value) {
                return self.call(ctx, key, arg).await;
            }
            Ok(match value {
                Y::Null => Property::Null,
                Y::Bool(b) => Property::Bool(*b),
                Y::Number(n) => Property::Number(
                    n.as_f64()
                        .ok_or_else(|| program_error(ctx, format!("number {} out of range", n)))?,
                ),
                Y::String(s) => self.interpolate(ctx, s)?,
                Y::Sequence(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        list.push(self.evaluate(&format!("{}[{}]", ctx, i), item).await?);
                    }
                    Property::List(list)
                }
                Y::Mapping(entries) => {
                    let mut map = IndexMap::with_capacity(entries.len());
                    for (key, item) in entries {
                        let key = key
                            .as_str()
                            .ok_or_else(|| program_error(ctx, "mapping keys must be strings"))?;
                        let item = self.evaluate(&format!("{}.{}", ctx, key), item).await?;
                        map.insert(key.to_string(), item);
                    }
                    Property::Map(map)
                }
                Y::Tagged(tagged) => self.evaluate(ctx, &tagged.value).await?,
            })
        }
        .boxed()
    }

    fn interpolate(&self, ctx: &str, template: &str) -> Result<Property> {
        let segments = resolver::parse_template(template).map_err(|e| program_error(ctx, e))?;
        match segments.as_slice() {
            [] => Ok(Property::String(String::new())),
            [Segment::Literal(text)] => Ok(Property::String(text.clone())),
            [Segment::Reference(r)] if r.path.is_empty() => {
                Ok(Property::Resource(self.resource(ctx, &r.resource)?.clone()))
            }
            [Segment::Reference(r)] => Ok(Property::Output(self.reference(ctx, r)?)),
            _ => {
                let pieces = segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => Ok(Output::new(text.clone())),
                        Segment::Reference(r) => {
                            Ok(self.reference(ctx, r)?.convert(|p| display_text(&p)))
                        }
                    })
                    .collect::<Result<Vec<Output<String>>>>()?;
                Ok(Property::Output(
                    Output::all(pieces).apply(|pieces| Property::String(pieces.concat())),
                ))
            }
        }
    }

    fn resource(&self, ctx: &str, key: &str) -> Result<&'a Resource> {
        self.resources
            .get(key)
            .ok_or_else(|| program_error(ctx, format!("unknown resource '{}'", key)))
    }

    /// `urn`, `id` or an output property, then nested lookups.
    fn reference(&self, ctx: &str, r: &Reference) -> Result<Output<Property>> {
        let resource = self.resource(ctx, &r.resource)?;
        let mut path = r.path.iter();
        let mut output = match path.next().map(String::as_str) {
            None | Some("urn") => resource.urn().convert(Property::String),
            Some("id") => resource
                .id()
                .ok_or_else(|| program_error(ctx, format!("component '{}' has no id", r.resource)))?
                .convert(Property::String),
            Some(name) => resource.output(name),
        };
        for segment in path {
            let segment = segment.clone();
            output = output.apply(move |p| lookup(p, &segment));
        }
        Ok(output)
    }

    async fn call(&self, ctx: &str, key: &str, arg: &Y) -> Result<Property> {
        let function = PropertyFn::from_key(key)
            .ok_or_else(|| program_error(ctx, format!("unknown function '{}'", key)))?;
        match function {
            PropertyFn::Secret => Ok(Property::Output(match self.evaluate(ctx, arg).await? {
                Property::Output(inner) => inner.with_secret(true),
                plain => Output::secret(plain),
            })),
            PropertyFn::Asset => Ok(Property::from(asset(ctx, arg)?)),
            PropertyFn::Archive => Ok(Property::from(archive(ctx, arg)?)),
            PropertyFn::Invoke => self.invoke(ctx, arg).await,
        }
    }

    async fn invoke(&self, ctx: &str, arg: &Y) -> Result<Property> {
        let spec = arg
            .as_mapping()
            .ok_or_else(|| program_error(ctx, "fn::invoke takes a mapping"))?;
        let token = spec
            .get("function")
            .and_then(Y::as_str)
            .ok_or_else(|| program_error(ctx, "fn::invoke has no function"))?;
        let args = match spec.get("arguments") {
            Some(arguments) => self.evaluate(ctx, arguments).await?,
            None => Property::Null,
        };
        let provider = match spec.get("provider").and_then(Y::as_str) {
            Some(key) => Some(self.resource(ctx, key)?.clone()),
            None => None,
        };
        let opts = InvokeOptions {
            provider,
            version: spec.get("version").and_then(Y::as_str).map(str::to_string),
        };

        let data = self.deployment.invoke(token, args, opts).await?;
        let data = match spec.get("return").and_then(Y::as_str) {
            Some(field) => data.map(|p| lookup(p, field)),
            None => data,
        };
        Ok(Property::Output(Output::from_data(data)))
    }
}

/// Map entry or list element, `Null` when missing.
fn lookup(value: Property, segment: &str) -> Property {
    match value {
        Property::Map(mut entries) => entries.shift_remove(segment).unwrap_or(Property::Null),
        Property::List(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| items.into_iter().nth(i))
            .unwrap_or(Property::Null),
        _ => Property::Null,
    }
}

/// Text spliced into an interpolated string.
fn display_text(value: &Property) -> String {
    match value {
        Property::Null => String::new(),
        Property::String(s) => s.clone(),
        Property::Bool(b) => b.to_string(),
        Property::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Property::Number(n) => n.to_string(),
        other => other
            .to_plain_json()
            .map(|json| json.to_string())
            .unwrap_or_default(),
    }
}

fn asset(ctx: &str, arg: &Y) -> Result<Asset> {
    match single_string_field(arg, &["text", "path", "uri"]) {
        Some(("text", text)) => Ok(Asset::text(text)),
        Some(("path", path)) => Ok(Asset::file(path)),
        Some((_, uri)) => Ok(Asset::remote(uri)),
        None => Err(program_error(ctx, "fn::asset needs exactly one of text, path or uri")),
    }
}

fn archive(ctx: &str, arg: &Y) -> Result<Archive> {
    if let Some(assets) = arg.as_mapping().and_then(|m| m.get("assets")) {
        let entries = assets
            .as_mapping()
            .ok_or_else(|| program_error(ctx, "fn::archive assets must be a mapping"))?;
        let mut members = IndexMap::new();
        for (name, entry) in entries {
            let name = name
                .as_str()
                .ok_or_else(|| program_error(ctx, "archive member names must be strings"))?;
            let entry_ctx = format!("{}.assets.{}", ctx, name);
            let member = match as_function_call(entry).and_then(|(k, a)| Some((PropertyFn::from_key(k)?, a))) {
                Some((PropertyFn::Asset, a)) => AssetOrArchive::Asset(asset(&entry_ctx, a)?),
                Some((PropertyFn::Archive, a)) => AssetOrArchive::Archive(archive(&entry_ctx, a)?),
                _ => {
                    return Err(program_error(&entry_ctx, "must be an fn::asset or fn::archive"))
                }
            };
            members.insert(name.to_string(), member);
        }
        return Ok(Archive::Assets(members));
    }
    match single_string_field(arg, &["path", "uri"]) {
        Some(("path", path)) => Ok(Archive::file(path)),
        Some((_, uri)) => Ok(Archive::remote(uri)),
        None => Err(program_error(ctx, "fn::archive needs exactly one of path, uri or assets")),
    }
}

/// Evaluate one declaration and register it.
async fn declare(
    deployment: &Deployment,
    resources: &IndexMap<String, Resource>,
    key: &str,
    decl: &ResourceDecl,
) -> Result<Resource> {
    let scope = Scope {
        deployment,
        resources,
    };
    let mut props = IndexMap::new();
    for (name, value) in &decl.properties {
        let ctx = format!("{}.{}", key, name);
        props.insert(name.clone(), scope.evaluate(&ctx, value).await?);
    }

    let mut opts = ResourceOptions::new().protect(decl.protect);
    if let Some(parent) = &decl.parent {
        opts = opts.parent(scope.resource(key, parent)?.clone());
    }
    for dep in &decl.depends_on {
        opts = opts.depends_on(scope.resource(key, dep)?.clone());
    }
    if let Some(provider) = &decl.provider {
        opts = opts.provider(scope.resource(key, provider)?.clone());
    }
    if let Some(version) = &decl.version {
        opts = opts.version(version.clone());
    }

    let name = decl.name.as_deref().unwrap_or(key);
    debug!("Declaring {} resource '{}' ({})", decl.kind_label(), name, decl.type_token);
    let args = Property::Map(props);
    Ok(if decl.component {
        deployment.register_component(&decl.type_token, name, args, opts)
    } else {
        deployment.register_custom(&decl.type_token, name, args, opts)
    })
}

/// JSON rendering of a settled value, masking secrets and unknowns.
fn describe(data: &OutputData<Property>) -> serde_json::Value {
    if !data.known {
        return serde_json::Value::String(UNKNOWN_DISPLAY.into());
    }
    if data.secret {
        return serde_json::Value::String(SECRET_DISPLAY.into());
    }
    match &data.value {
        None => serde_json::Value::Null,
        Some(value) => value
            .to_plain_json()
            .unwrap_or_else(|| serde_json::Value::String(display_text(value))),
    }
}

/// Fully resolve a property graph by passing it through the wire codec.
async fn settle(ctx: &str, value: &Property) -> Result<OutputData<Property>> {
    let (wire, _) = serialization::serialize(ctx, value, false).await?;
    serialization::deserialize(&wire)
}

/// Run a program against `deployment` and report what it resolved to.
pub async fn execute(config: &ProgramConfig, deployment: &Deployment) -> Result<RunSummary> {
    let order = resolver::build_execution_order(config).map_err(Error::Program)?;
    let settings = deployment.settings().clone();
    info!(
        "Executing program '{}' ({} resources)",
        config.name,
        order.len()
    );

    let (stack, resources, outputs) = deployment
        .run(|d| async move {
            let stack_name = format!("{}-{}", settings.project, settings.stack);
            let stack = d.register_component(
                STACK_TYPE,
                &stack_name,
                Property::Null,
                ResourceOptions::new(),
            );

            let mut resources = IndexMap::new();
            for key in &order {
                let decl = config
                    .resources
                    .get(key)
                    .ok_or_else(|| Error::Program(format!("undeclared resource '{}'", key)))?;
                let resource = declare(&d, &resources, key, decl).await?;
                resources.insert(key.clone(), resource);
            }

            let scope = Scope {
                deployment: &d,
                resources: &resources,
            };
            let mut outputs = IndexMap::new();
            for (key, value) in &config.outputs {
                let ctx = format!("outputs.{}", key);
                outputs.insert(key.clone(), scope.evaluate(&ctx, value).await?);
            }
            d.register_outputs(&stack, outputs.clone());
            Ok::<_, Error>((stack, resources, outputs))
        })
        .await?;

    let mut summary = RunSummary {
        stack_urn: stack.urn().value().await,
        preview: deployment.is_dry_run(),
        resources: Vec::with_capacity(resources.len()),
        outputs: IndexMap::new(),
    };
    for (key, resource) in &resources {
        let id = match resource.id() {
            Some(id) => id.value().await,
            None => None,
        };
        let names: Vec<String> = match resource.outputs().value().await {
            Some(Property::Map(entries)) => entries.into_keys().collect(),
            _ => Vec::new(),
        };
        let mut outputs = serde_json::Map::new();
        for name in names {
            let data = resource.output(&name).data().await;
            outputs.insert(name, describe(&data));
        }
        summary.resources.push(ResourceSummary {
            key: key.clone(),
            type_token: resource.type_token().to_string(),
            urn: resource.urn().value().await,
            id,
            outputs: serde_json::Value::Object(outputs),
        });
    }
    for (key, value) in &outputs {
        let data = settle(&format!("outputs.{}", key), value).await?;
        summary.outputs.insert(key.clone(), describe(&data));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_program;
    use crate::deployment::Settings;
    use crate::serialization::constants::*;
    use crate::serialization::Value;
    use crate::transport::local::LocalEngine;
    use std::sync::Arc;

    const SITE: &str = r#"
version: "1.0"
name: web
resources:
  bucket:
    type: aws:s3/bucket:Bucket
    properties:
      name: logs
      size: 3
  object:
    type: aws:s3/object:Object
    properties:
      bucket: "${bucket.id}"
      key: "${bucket.name}/index.html"
      size: "${bucket.size}"
      source: {fn::asset: {text: "<h1>hi</h1>"}}
outputs:
  url: "s3://${bucket.name}/${object.key}"
  password: {fn::secret: hunter2}
"#;

    fn setup(dry_run: bool) -> (Arc<LocalEngine>, Deployment) {
        let engine = Arc::new(LocalEngine::new("dev", "web", dry_run));
        let settings = Settings {
            project: "web".into(),
            dry_run,
            ..Settings::default()
        };
        (engine.clone(), Deployment::new(settings, engine))
    }

    #[tokio::test]
    async fn test_execute_site_program() {
        let config = parse_program(SITE).unwrap();
        let (engine, deployment) = setup(false);
        let summary = execute(&config, &deployment).await.unwrap();

        assert!(!summary.preview);
        assert_eq!(
            summary.stack_urn.as_deref(),
            Some("urn:pulumi:dev::web::pulumi:pulumi:Stack::web-dev")
        );
        let keys: Vec<_> = summary.resources.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["bucket", "object"]);

        let bucket = &summary.resources[0];
        let bucket_id = bucket.id.clone().unwrap();
        assert!(bucket_id.starts_with("bucket-"));
        assert_eq!(bucket.outputs["name"], "logs");

        let object = &summary.resources[1];
        assert_eq!(object.outputs["bucket"], serde_json::json!(bucket_id));
        assert_eq!(object.outputs["key"], "logs/index.html");
        assert_eq!(object.outputs["size"], 3.0);

        assert_eq!(summary.outputs["url"], "s3://logs/logs/index.html");
        assert_eq!(summary.outputs["password"], SECRET_DISPLAY);

        let regs = engine.registrations();
        let object_req = regs.iter().find(|r| r.name == "object").unwrap();
        assert_eq!(
            object_req.dependencies,
            vec!["urn:pulumi:dev::web::aws:s3/bucket:Bucket::bucket".to_string()]
        );
        assert_eq!(
            object_req.object["source"].signature(),
            Some(SPECIAL_ASSET_SIG)
        );
        let stack_outputs = engine
            .registered_outputs("urn:pulumi:dev::web::pulumi:pulumi:Stack::web-dev")
            .unwrap();
        assert_eq!(
            stack_outputs["password"].signature(),
            Some(SPECIAL_SECRET_SIG)
        );
    }

    #[tokio::test]
    async fn test_execute_preview_unknowns() {
        let config = parse_program(SITE).unwrap();
        let (engine, deployment) = setup(true);
        let summary = execute(&config, &deployment).await.unwrap();

        assert!(summary.preview);
        assert!(summary.resources[0].id.is_none());
        assert_eq!(summary.resources[1].outputs["bucket"], UNKNOWN_DISPLAY);
        assert_eq!(summary.resources[1].outputs["key"], "logs/index.html");

        let regs = engine.registrations();
        let object_req = regs.iter().find(|r| r.name == "object").unwrap();
        assert_eq!(object_req.object["bucket"], Value::from(UNKNOWN_VALUE));
    }

    #[tokio::test]
    async fn test_execute_invoke_and_references() {
        let yaml = r#"
version: "1.0"
name: web
resources:
  site:
    type: my:index:Site
    component: true
  peer:
    type: pkg:index:Thing
    name: custom-name
    parent: site
  thing:
    type: pkg:index:Thing
    depends_on: [peer]
    properties:
      answer:
        fn::invoke:
          function: strata:index:echo
          arguments: {v: 42, w: [a, b]}
          return: v
      second: "${peer.missing}"
      target: "${peer}"
      site: "${site.urn}"
"#;
        let config = parse_program(yaml).unwrap();
        let (engine, deployment) = setup(false);
        let summary = execute(&config, &deployment).await.unwrap();

        let thing = summary.resources.iter().find(|r| r.key == "thing").unwrap();
        assert_eq!(thing.outputs["answer"], 42.0);
        assert!(thing.outputs["second"].is_null());

        let regs = engine.registrations();
        let peer = regs.iter().find(|r| r.name == "custom-name").unwrap();
        assert_eq!(
            peer.parent.as_deref(),
            Some("urn:pulumi:dev::web::my:index:Site::site")
        );
        let thing_req = regs.iter().find(|r| r.name == "thing").unwrap();
        assert_eq!(thing_req.object["target"].signature(), Some(SPECIAL_RESOURCE_SIG));
        assert_eq!(
            thing_req.object["site"],
            Value::from("urn:pulumi:dev::web::my:index:Site::site")
        );
        assert!(thing_req
            .dependencies
            .contains(&"urn:pulumi:dev::web::my:index:Site$pkg:index:Thing::custom-name".to_string()));
    }

    #[tokio::test]
    async fn test_execute_archive_members() {
        let yaml = r#"
version: "1.0"
name: web
resources:
  fn:
    type: aws:lambda/function:Function
    properties:
      code:
        fn::archive:
          assets:
            index.js: {fn::asset: {text: "exports.handler = 1"}}
            lib: {fn::archive: {path: ./lib}}
"#;
        let config = parse_program(yaml).unwrap();
        let (engine, deployment) = setup(false);
        execute(&config, &deployment).await.unwrap();
        let regs = engine.registrations();
        let function = regs.iter().find(|r| r.name == "fn").unwrap();
        let code = function.object["code"].as_struct().unwrap();
        assert_eq!(code[SPECIAL_SIG_KEY], Value::from(SPECIAL_ARCHIVE_SIG));
        let members = code[ARCHIVE_ASSETS_NAME].as_struct().unwrap();
        assert_eq!(members["lib"].signature(), Some(SPECIAL_ARCHIVE_SIG));
        assert_eq!(members["index.js"].signature(), Some(SPECIAL_ASSET_SIG));
    }

    #[tokio::test]
    async fn test_execute_failed_invoke() {
        let yaml = r#"
version: "1.0"
name: web
resources:
  a:
    type: pkg:index:Thing
    properties:
      x: {fn::invoke: {function: "nope:index:missing"}}
"#;
        let config = parse_program(yaml).unwrap();
        let (_, deployment) = setup(false);
        let err = execute(&config, &deployment).await.unwrap_err();
        assert!(matches!(err, Error::Monitor(_)));
    }

    #[tokio::test]
    async fn test_execute_cycle_rejected() {
        let yaml = r#"
version: "1.0"
name: web
resources:
  a:
    type: pkg:index:Thing
    depends_on: [b]
  b:
    type: pkg:index:Thing
    depends_on: [a]
"#;
        let config = parse_program(yaml).unwrap();
        let (engine, deployment) = setup(false);
        let err = execute(&config, &deployment).await.unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert!(engine.requests().is_empty());
    }

    #[test]
    fn test_display_text() {
        assert_eq!(display_text(&Property::Number(3.0)), "3");
        assert_eq!(display_text(&Property::Number(2.5)), "2.5");
        assert_eq!(display_text(&Property::Null), "");
        assert_eq!(
            display_text(&Property::List(vec![Property::from("a")])),
            "[\"a\"]"
        );
    }

    #[test]
    fn test_lookup_paths() {
        let value = Property::map([(
            "list",
            Property::List(vec![Property::from("x"), Property::from("y")]),
        )]);
        assert_eq!(
            lookup(lookup(value.clone(), "list"), "1"),
            Property::from("y")
        );
        assert_eq!(lookup(value, "missing"), Property::Null);
    }
}
