//! CLI subcommands: validate, preview, up, decode.

use crate::core::{executor, parser, types};
use crate::deployment::{Deployment, Settings};
use crate::output::OutputData;
use crate::property::Property;
use crate::resources::Resource;
use crate::serialization::{self, Value};
use crate::transport::local::LocalEngine;
use clap::Subcommand;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate strata.yaml without running it
    Validate {
        /// Path to strata.yaml
        #[arg(short, long, default_value = "strata.yaml")]
        file: PathBuf,
    },

    /// Run the program in preview mode against the in-memory engine
    Preview {
        /// Path to strata.yaml
        #[arg(short, long, default_value = "strata.yaml")]
        file: PathBuf,

        /// Stack name (overrides settings and STRATA_STACK)
        #[arg(short, long)]
        stack: Option<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the program against the in-memory engine
    Up {
        /// Path to strata.yaml
        #[arg(short, long, default_value = "strata.yaml")]
        file: PathBuf,

        /// Stack name (overrides settings and STRATA_STACK)
        #[arg(short, long)]
        stack: Option<String>,

        /// Run in preview mode
        #[arg(long)]
        preview: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a wire-format JSON document and report what it carries
    Decode {
        /// JSON file, or "-" for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Preview { file, stack, json } => cmd_run(&file, stack.as_deref(), true, json),
        Commands::Up {
            file,
            stack,
            preview,
            json,
        } => cmd_run(&file, stack.as_deref(), preview, json),
        Commands::Decode { input } => cmd_decode(&input),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_program_file(file)?;
    let errors = parser::validate_program(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} resources, {} outputs)",
            config.name,
            config.resources.len(),
            config.outputs.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a program file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::ProgramConfig, String> {
    let config = parser::parse_program_file(file)?;
    let errors = parser::validate_program(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// File settings, then `STRATA_*` variables, then flags.
fn resolve_settings(
    config: &types::ProgramConfig,
    stack: Option<&str>,
    preview: bool,
) -> Settings {
    let mut settings = config.effective_settings().with_env();
    if let Some(stack) = stack {
        settings.stack = stack.to_string();
    }
    if preview {
        settings.dry_run = true;
    }
    settings
}

fn cmd_run(file: &Path, stack: Option<&str>, preview: bool, json: bool) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let settings = resolve_settings(&config, stack, preview);
    let summary = run_program(&config, settings)?;

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{}", rendered);
    } else {
        print_summary(&config.name, &summary);
    }
    Ok(())
}

/// Execute against a fresh in-memory engine on its own runtime.
fn run_program(
    config: &types::ProgramConfig,
    settings: Settings,
) -> Result<types::RunSummary, String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {}", e))?;
    let engine = Arc::new(LocalEngine::new(
        settings.stack.clone(),
        settings.project.clone(),
        settings.dry_run,
    ));
    let deployment = Deployment::new(settings, engine);
    runtime
        .block_on(executor::execute(config, &deployment))
        .map_err(|e| e.to_string())
}

fn print_summary(name: &str, summary: &types::RunSummary) {
    let verb = if summary.preview { "Previewing" } else { "Updating" };
    println!("{}: {} ({} resources)", verb, name, summary.resources.len());
    println!();

    for resource in &summary.resources {
        let symbol = if summary.preview { "~" } else { "+" };
        println!("  {} {} ({})", symbol, resource.key, resource.type_token);
        if let Some(urn) = &resource.urn {
            println!("      urn: {}", urn);
        }
        if let Some(id) = &resource.id {
            println!("      id:  {}", id);
        }
    }

    if !summary.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for (key, value) in &summary.outputs {
            println!("  {}: {}", key, value);
        }
    }

    println!();
    if summary.preview {
        println!("Preview complete: {} resources would be registered.", summary.resources.len());
    } else {
        println!("Update complete: {} resources registered.", summary.resources.len());
    }
}

fn read_input(input: &Path) -> Result<String, String> {
    if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {}", e))?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).map_err(|e| format!("failed to read {}: {}", input.display(), e))
}

/// Deserialize a wire document into a report of its flags and payload.
fn decode_report(json: &str) -> Result<serde_json::Value, String> {
    let raw: serde_json::Value =
        serde_json::from_str(json).map_err(|e| format!("JSON parse error: {}", e))?;
    let wire = Value::from_json(&raw).map_err(|e| e.to_string())?;
    let data = serialization::deserialize(&wire).map_err(|e| e.to_string())?;
    Ok(report(&data))
}

/// Resource references anywhere inside a payload.
fn referenced_resources<'a>(value: &'a Property, found: &mut Vec<&'a Resource>) {
    match value {
        Property::Resource(resource) => found.push(resource),
        Property::List(items) => items.iter().for_each(|v| referenced_resources(v, found)),
        Property::Map(entries) => entries.values().for_each(|v| referenced_resources(v, found)),
        Property::Optional(Some(inner)) => referenced_resources(inner, found),
        _ => {}
    }
}

fn report(data: &OutputData<Property>) -> serde_json::Value {
    let mut found = Vec::new();
    if let Some(value) = &data.value {
        referenced_resources(value, &mut found);
    }
    let mut urns: Vec<String> = futures::executor::block_on(async {
        let mut urns = Vec::with_capacity(found.len());
        for resource in &found {
            urns.extend(resource.urn().value().await);
        }
        urns
    });
    urns.sort();
    urns.dedup();
    let value = data.value.as_ref().map(|v| {
        v.to_plain_json()
            .unwrap_or_else(|| serde_json::Value::String(format!("{:?}", v)))
    });
    serde_json::json!({
        "known": data.known,
        "secret": data.secret,
        "resources": urns,
        "value": value,
    })
}

fn cmd_decode(input: &Path) -> Result<(), String> {
    let report = decode_report(&read_input(input)?)?;
    let rendered = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}
