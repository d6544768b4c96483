//! Interpolation parsing and dependency DAG construction.
//!
//! Parses `${key.path}` references out of property strings. Builds a DAG from
//! explicit `depends_on` edges plus the implicit edges contributed by
//! references, `parent` and `provider`, and computes topological order using
//! Kahn's algorithm with deterministic (alphabetical) tie-breaking.

use super::types::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Split a string into literal text and `${...}` references.
///
/// `$${` is an escaped literal `${`.
pub fn parse_template(template: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(pos) = rest.find("${") {
        if pos > 0 && rest[..pos].ends_with('$') {
            literal.push_str(&rest[..pos - 1]);
            literal.push_str("${");
            rest = &rest[pos + 2..];
            continue;
        }
        literal.push_str(&rest[..pos]);
        let close = rest[pos..]
            .find('}')
            .ok_or_else(|| format!("unclosed interpolation in '{}'", template))?;
        let body = rest[pos + 2..pos + close].trim();
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
        segments.push(Segment::Reference(parse_reference(body)?));
        rest = &rest[pos + close + 1..];
    }
    literal.push_str(rest);
    segments.push(Segment::Literal(literal));
    segments.retain(|s| !matches!(s, Segment::Literal(l) if l.is_empty()));
    Ok(segments)
}

fn parse_reference(body: &str) -> Result<Reference, String> {
    let mut parts = body.split('.');
    let resource = parts.next().unwrap_or_default();
    let path: Vec<String> = parts.map(str::to_string).collect();
    if resource.is_empty() || path.iter().any(String::is_empty) {
        return Err(format!("invalid reference '${{{}}}'", body));
    }
    Ok(Reference {
        resource: resource.to_string(),
        path,
    })
}

/// Every reference found anywhere inside a YAML value.
pub fn collect_references(value: &serde_yaml_ng::Value) -> Result<Vec<Reference>, String> {
    let mut refs = Vec::new();
    collect_into(value, &mut refs)?;
    Ok(refs)
}

fn collect_into(value: &serde_yaml_ng::Value, refs: &mut Vec<Reference>) -> Result<(), String> {
    use serde_yaml_ng::Value as Y;
    match value {
        Y::String(s) => {
            for segment in parse_template(s)? {
                if let Segment::Reference(r) = segment {
                    refs.push(r);
                }
            }
        }
        Y::Sequence(items) => {
            for item in items {
                collect_into(item, refs)?;
            }
        }
        Y::Mapping(entries) => {
            for (_, item) in entries {
                collect_into(item, refs)?;
            }
        }
        Y::Tagged(tagged) => collect_into(&tagged.value, refs)?,
        Y::Null | Y::Bool(_) | Y::Number(_) => {}
    }
    Ok(())
}

/// Keys of every resource `decl` must wait for.
pub fn resource_dependencies(decl: &ResourceDecl) -> Result<BTreeSet<String>, String> {
    let mut deps: BTreeSet<String> = decl.depends_on.iter().cloned().collect();
    deps.extend(decl.parent.iter().cloned());
    deps.extend(decl.provider.iter().cloned());
    for value in decl.properties.values() {
        for r in collect_references(value)? {
            deps.insert(r.resource);
        }
    }
    Ok(deps)
}

/// Build a topological execution order from resource dependencies.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(config: &ProgramConfig) -> Result<Vec<String>, String> {
    let resource_ids: Vec<String> = config.resources.keys().cloned().collect();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for id in &resource_ids {
        in_degree.insert(id.clone(), 0);
        adjacency.insert(id.clone(), Vec::new());
    }

    for (id, resource) in &config.resources {
        for dep in resource_dependencies(resource)? {
            if dep == *id {
                return Err(format!("resource '{}' depends on itself", id));
            }
            let Some(dependents) = adjacency.get_mut(&dep) else {
                return Err(format!("resource '{}' depends on unknown '{}'", id, dep));
            };
            dependents.push(id.clone());
            *in_degree.entry(id.clone()).or_default() += 1;
        }
    }

    // Kahn's algorithm with sorted tie-breaking
    let mut zero_degree: Vec<String> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    zero_degree.sort();
    let mut queue: VecDeque<String> = zero_degree.into();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        let mut next_ready: Vec<String> = Vec::new();
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(neighbor.clone());
                    }
                }
            }
        }
        order.push(current);
        next_ready.sort();
        queue.extend(next_ready);
    }

    if order.len() != resource_ids.len() {
        let ordered: HashSet<_> = order.iter().collect();
        let mut cycle_members: Vec<&str> = resource_ids
            .iter()
            .filter(|id| !ordered.contains(id))
            .map(String::as_str)
            .collect();
        cycle_members.sort();
        return Err(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(yaml: &str) -> ProgramConfig {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    fn reference(resource: &str, path: &[&str]) -> Segment {
        Segment::Reference(Reference {
            resource: resource.into(),
            path: path.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_template_whole_reference() {
        let segments = parse_template("${bucket.arn}").unwrap();
        assert_eq!(segments, vec![reference("bucket", &["arn"])]);
    }

    #[test]
    fn test_template_mixed() {
        let segments = parse_template("s3://${bucket.name}/${obj.key.sub}!").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("s3://".into()),
                reference("bucket", &["name"]),
                Segment::Literal("/".into()),
                reference("obj", &["key", "sub"]),
                Segment::Literal("!".into()),
            ]
        );
    }

    #[test]
    fn test_template_plain_and_escape() {
        assert_eq!(
            parse_template("plain").unwrap(),
            vec![Segment::Literal("plain".into())]
        );
        assert_eq!(
            parse_template("cost $${x}").unwrap(),
            vec![Segment::Literal("cost ${x}".into())]
        );
        assert!(parse_template("").unwrap().is_empty());
    }

    #[test]
    fn test_template_errors() {
        assert!(parse_template("${bucket.arn").unwrap_err().contains("unclosed"));
        assert!(parse_template("${}").unwrap_err().contains("invalid reference"));
        assert!(parse_template("${a..b}").is_err());
    }

    #[test]
    fn test_collect_references_nested() {
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(
            r#"
tags: ["${a.x}", plain]
nested:
  deep: "${b}"
  n: 3
"#,
        )
        .unwrap();
        let refs = collect_references(&value).unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.resource.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(refs[1].path.is_empty());
    }

    #[test]
    fn test_topo_implicit_edges() {
        let config = program(
            r#"
version: "1.0"
name: test
resources:
  site:
    type: my:index:Site
    component: true
  object:
    type: aws:s3/object:Object
    parent: site
    properties:
      bucket: "${bucket.id}"
  bucket:
    type: aws:s3/bucket:Bucket
"#,
        );
        let order = build_execution_order(&config).unwrap();
        assert_eq!(order, vec!["bucket", "site", "object"]);
    }

    #[test]
    fn test_topo_parallel_alphabetical() {
        let config = program(
            r#"
version: "1.0"
name: test
resources:
  beta:
    type: pkg:index:Thing
  alpha:
    type: pkg:index:Thing
"#,
        );
        assert_eq!(build_execution_order(&config).unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_topo_diamond() {
        let config = program(
            r#"
version: "1.0"
name: test
resources:
  top:
    type: pkg:index:Thing
  left:
    type: pkg:index:Thing
    depends_on: [top]
  right:
    type: pkg:index:Thing
    properties:
      up: "${top.value}"
  bottom:
    type: pkg:index:Thing
    depends_on: [left, right]
"#,
        );
        let order = build_execution_order(&config).unwrap();
        assert_eq!(order, vec!["top", "left", "right", "bottom"]);
    }

    #[test]
    fn test_topo_cycle() {
        let config = program(
            r#"
version: "1.0"
name: test
resources:
  a:
    type: pkg:index:Thing
    properties:
      x: "${b.x}"
  b:
    type: pkg:index:Thing
    depends_on: [a]
"#,
        );
        let err = build_execution_order(&config).unwrap_err();
        assert!(err.contains("cycle"));
        assert!(err.contains("a, b"));
    }

    #[test]
    fn test_topo_unknown_and_self() {
        let config = program(
            r#"
version: "1.0"
name: test
resources:
  a:
    type: pkg:index:Thing
    properties:
      x: "${ghost.x}"
"#,
        );
        assert!(build_execution_order(&config).unwrap_err().contains("unknown 'ghost'"));

        let config = program(
            r#"
version: "1.0"
name: test
resources:
  a:
    type: pkg:index:Thing
    depends_on: [a]
"#,
        );
        assert!(build_execution_order(&config).unwrap_err().contains("itself"));
    }
}
