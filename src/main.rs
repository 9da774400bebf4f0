use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;
use url::form_urlencoded;

use gateway_version::config::{VersioningConfig, load_config};
use gateway_version::logging::init_logging;
use gateway_version::version::{Detector, Migrators, parse_version};

#[derive(Parser)]
#[command(name = "gateway-version")]
#[command(version, about = "Inspect API version detection and payload migrations")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse version strings and print their parts
    Parse {
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Resolve the version a request would be served with
    Detect {
        #[arg(long, default_value = "/")]
        path: String,
        /// Request header as 'Name: value'
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Query parameter as 'key=value'
        #[arg(long = "query", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },
    /// Apply a configured migration to a JSON document
    Migrate {
        #[arg(long)]
        component: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Input file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected 'Name: value', got {:?}", raw))
}

fn parse_query(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected 'key=value', got {:?}", raw))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => VersioningConfig::default(),
    };
    let _guard = init_logging(&config.logging)?;

    let output = match cli.command {
        Command::Parse { versions } => parse(&versions),
        Command::Detect {
            path,
            headers,
            query,
        } => detect(&config, &path, &headers, &query)?,
        Command::Migrate {
            component,
            from,
            to,
            input,
        } => migrate(&config, &component, &from, &to, input.as_deref())?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse(versions: &[String]) -> Value {
    versions
        .iter()
        .map(|input| {
            let version = parse_version(input);
            json!({
                "input": input,
                "version": version,
                "canonical": version.canonical(),
                "major": version.major(),
                "minor": version.minor(),
                "patch": version.patch(),
                "label": version.label(),
                "opaque": version.is_opaque(),
            })
        })
        .collect()
}

fn detect(
    config: &VersioningConfig,
    path: &str,
    headers: &[(String, String)],
    query: &[(String, String)],
) -> anyhow::Result<Value> {
    let mut uri = path.to_string();
    if !query.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        uri = format!("{}?{}", uri, encoded);
    }

    let mut builder = http::Request::builder().uri(&uri);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = builder.body(()).context("building request")?;

    let detector = Detector::from_config(&config.detector);
    let result = detector.detect_from_request(&request);
    debug!("Detection result for {}: {:?}", uri, result);

    Ok(json!({
        "version": result.version,
        "method": result.method.to_string(),
        "source": result.source,
        "component": detector.extract_component(&request),
    }))
}

fn migrate(
    config: &VersioningConfig,
    component: &str,
    from: &str,
    to: &str,
    input: Option<&Path>,
) -> anyhow::Result<Value> {
    let migrators = Migrators::new();
    migrators.load_config(&config.migrations);
    let Some(migrator) = migrators.get(component) else {
        bail!("no migrations configured for component '{}'", component);
    };

    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let document: Value = serde_json::from_str(&raw).context("parsing input document")?;

    Ok(migrator.migrate(&parse_version(from), &parse_version(to), document)?)
}
