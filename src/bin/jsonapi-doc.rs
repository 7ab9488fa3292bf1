//! JSON-API document CLI
//!
//! Command-line interface for encoding fixtures and inspecting or validating
//! JSON-API documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonapi_doc::{
    load_json, parse_includes, validate_file, Data, Document, Encoder, EncoderConfig, Fixture,
    FixtureData, MemoryStore, Payload, RecordRef, ResourceRegistry, RootType, TypeMaker,
    ValidateError,
};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsonapi-doc")]
#[command(about = "Encode, inspect and validate JSON-API documents")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. warn, debug, jsonapi_doc=trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode the primary data of a fixture into a JSON-API document
    Encode {
        /// Fixture file (resources, records, data)
        fixture: PathBuf,

        /// Encoder configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Include paths, separated by the configured include separator
        #[arg(long, short)]
        include: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Summarize a JSON-API document
    Inspect {
        /// Document file
        document: PathBuf,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a document against a JSON Schema
    Validate {
        /// Document file to validate
        document: PathBuf,

        /// Schema file (default: the built-in JSON-API envelope schema)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Encode {
            fixture,
            config,
            include,
            output,
            pretty,
        } => run_encode(&fixture, config.as_deref(), include.as_deref(), output, pretty),

        Commands::Inspect { document, json } => run_inspect(&document, json),

        Commands::Validate {
            document,
            schema,
            json,
        } => run_validate(&document, schema.as_deref(), json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_encode(
    fixture_path: &Path,
    config_path: Option<&Path>,
    include: Option<&str>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let config = match config_path {
        Some(path) => EncoderConfig::from_file(path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?,
        None => EncoderConfig::default(),
    };

    let raw = load_json(fixture_path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let fixture: Fixture = serde_json::from_value(raw).map_err(|e| {
        eprintln!("Error: invalid fixture: {}", e);
        2u8
    })?;

    let store = fixture.store();
    let payload = primary_payload(&store, &fixture.data).map_err(|msg| {
        eprintln!("Error: {}", msg);
        2u8
    })?;

    let includes = include.map(|value| parse_includes(value, &config));
    let registry =
        ResourceRegistry::new(TypeMaker::from_config(&config)).with_source(fixture.resources);
    let mut encoder = Encoder::new(config, registry);
    let response = encoder.response(&payload, includes);

    write_json(&response.body, output.as_deref(), pretty)?;

    if response.status >= 400 {
        eprintln!("Error: encoding produced an error document (status {})", response.status);
        Err(1)
    } else {
        Ok(())
    }
}

fn primary_payload(store: &MemoryStore, data: &FixtureData) -> Result<Payload, String> {
    let lookup = |kind: &str, id: &str| -> Result<RecordRef, String> {
        store
            .get(kind, id)
            .ok_or_else(|| format!("fixture data references unknown record {}#{}", kind, id))
    };

    match data {
        FixtureData::Null => Ok(Payload::Value(Value::Null)),
        FixtureData::One(key) => Ok(Payload::Record(lookup(&key.kind, &key.id)?)),
        FixtureData::Many(keys) => {
            let records = keys
                .iter()
                .map(|key| lookup(&key.kind, &key.id))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Payload::Records(records))
        }
    }
}

fn write_json(value: &Value, output: Option<&Path>, pretty: bool) -> Result<(), u8> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &text).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", text);
        }
    }

    Ok(())
}

fn run_inspect(path: &Path, json_output: bool) -> Result<(), u8> {
    let mut document = Document::from_file(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let summary = summarize(&mut document).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    if json_output {
        println!("{}", summary);
        return Ok(());
    }

    println!("root: {}", summary["root"].as_str().unwrap_or("unknown"));
    println!("data: {}", summary["data"].as_str().unwrap_or("none"));
    for resource in summary["resources"].as_array().into_iter().flatten() {
        println!("  {}", describe_resource(resource));
    }
    let included = summary["included"].as_array().map_or(0, Vec::len);
    println!("included: {}", included);
    for resource in summary["included"].as_array().into_iter().flatten() {
        println!("  {}", describe_resource(resource));
    }
    for error in summary["errors"].as_array().into_iter().flatten() {
        println!(
            "error {}: {}",
            error["status"].as_str().unwrap_or("-"),
            error["title"].as_str().or(error["detail"].as_str()).unwrap_or("")
        );
    }
    Ok(())
}

fn describe_resource(resource: &Value) -> String {
    let relationships: Vec<&str> = resource["relationships"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    format!(
        "{}:{} ({} attributes{}{})",
        resource["type"].as_str().unwrap_or("?"),
        resource["id"].as_str().unwrap_or("?"),
        resource["attributes"].as_u64().unwrap_or(0),
        if relationships.is_empty() { "" } else { "; relationships: " },
        relationships.join(", ")
    )
}

fn summarize(document: &mut Document) -> Result<Value, jsonapi_doc::DocumentError> {
    let root = match document.root_type() {
        RootType::Resource => "resource",
        RootType::Error => "error",
        RootType::Meta => "meta",
        RootType::Unknown => "unknown",
    };

    let data = document.data()?;
    let shape = match &data {
        Data::Null => "null",
        Data::Single(_) => "single",
        Data::Many(_) => "multiple",
    };

    let mut resources = Vec::new();
    for resource in data.resources() {
        resources.push(resource_summary(document, resource)?);
    }

    let mut included = Vec::new();
    for resource in document.included()? {
        included.push(resource_summary(document, resource)?);
    }

    let errors: Vec<Value> = document
        .errors()?
        .into_iter()
        .map(|error| {
            json!({
                "status": document.error_field(error, "status"),
                "title": document.error_field(error, "title"),
                "detail": document.error_field(error, "detail"),
                "pointer": document.error_pointer(error),
            })
        })
        .collect();

    Ok(json!({
        "root": root,
        "data": shape,
        "resources": resources,
        "included": included,
        "errors": errors,
    }))
}

fn resource_summary(
    document: &mut Document,
    resource: jsonapi_doc::Resource,
) -> Result<Value, jsonapi_doc::DocumentError> {
    let attributes = document.attributes(resource)?;
    let attribute_count = document.raw(attributes).map_or(0, Map::len);
    let relationships = document.relationship_keys(resource)?;
    Ok(json!({
        "type": document.resource_type(resource),
        "id": document.resource_id(resource),
        "attributes": attribute_count,
        "relationships": relationships,
    }))
}

fn run_validate(document: &Path, schema: Option<&Path>, json_output: bool) -> Result<(), u8> {
    match validate_file(document, schema) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
