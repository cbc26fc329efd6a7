use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::{Catalog, HttpTransport, NodeSpec, Transport};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use share::{
    HttpShortLinkService, InitSource, LinkPayload, ShareConfig, ShareDocument, ShortLinkService,
    ViewState, build_share_document, decode, replay, resolve, shorten_if_possible,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Create, inspect and replay catalog share links")]
struct Args {
    /// Share configuration file (JSON). ATLAS_* variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a share document into a link
    Link {
        /// Share document (JSON)
        document: PathBuf,

        /// Use the short-link service when one is configured
        #[arg(long)]
        shorten: bool,

        /// Extra link parameter as key=value; only whitelisted keys are kept
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Print what a link carries
    Decode {
        uri: String,

        /// Fetch the document behind a short link
        #[arg(long)]
        resolve: bool,
    },

    /// Replay a link onto a base catalog and print the resulting share document
    Replay {
        uri: String,

        /// Base catalog: a JSON array of nodes or an object with `catalog`
        #[arg(long)]
        catalog: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<(), String> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ShareConfig::load(path).map_err(|e| e.to_string())?,
        None => ShareConfig::default(),
    }
    .with_env_overrides();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());
    let service = HttpShortLinkService::new(config.shortlink_url.clone(), transport.clone());

    match args.command {
        Command::Link {
            document,
            shorten,
            params,
        } => cmd_link(&config, &service, &document, shorten, &params).await,
        Command::Decode { uri, resolve } => cmd_decode(&config, &service, &uri, resolve).await,
        Command::Replay { uri, catalog } => {
            cmd_replay(&config, transport, &service, &uri, &catalog).await
        }
    }
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("parse {path:?}: {e}"))
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

async fn cmd_link(
    config: &ShareConfig,
    service: &HttpShortLinkService,
    path: &Path,
    shorten: bool,
    params: &[String],
) -> Result<(), String> {
    let document = ShareDocument::from_value(read_json(path)?).map_err(|e| e.to_string())?;

    let mut options = config.link_options();
    for param in params {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| format!("--param expects key=value, got {param}"))?;
        options = options.with_param(key, value);
    }

    let service = if shorten {
        Some(service as &dyn ShortLinkService)
    } else {
        None
    };
    let uri = shorten_if_possible(&document, &options, service)
        .await
        .map_err(|e| e.to_string())?;
    println!("{uri}");
    Ok(())
}

async fn cmd_decode(
    config: &ShareConfig,
    service: &HttpShortLinkService,
    uri: &str,
    fetch: bool,
) -> Result<(), String> {
    let decoded = decode(uri, &config.param_whitelist).map_err(|e| e.to_string())?;

    let payload = match &decoded.payload {
        LinkPayload::Token(token) if fetch => {
            let document = resolve(&decoded, Some(service as &dyn ShortLinkService))
                .await
                .map_err(|e| e.to_string())?;
            json!({ "token": token, "document": document })
        }
        LinkPayload::Token(token) => json!({ "token": token }),
        LinkPayload::Document(document) => json!({ "document": document }),
        LinkPayload::None => Value::Null,
    };
    let init_files = decoded
        .init_file_urls(&config.app_url)
        .map_err(|e| e.to_string())?;
    let params: serde_json::Map<String, Value> = decoded
        .user_params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    print_json(&json!({
        "payload": payload,
        "initFiles": init_files,
        "params": params,
    }))
}

fn base_catalog(value: Value) -> Result<Vec<NodeSpec>, String> {
    let nodes = match value {
        Value::Object(mut map) => map
            .remove("catalog")
            .ok_or_else(|| "catalog file has no `catalog` key".to_string())?,
        other => other,
    };
    serde_json::from_value(nodes).map_err(|e| format!("invalid catalog: {e}"))
}

async fn cmd_replay(
    config: &ShareConfig,
    transport: Arc<dyn Transport>,
    service: &HttpShortLinkService,
    uri: &str,
    catalog_path: &Path,
) -> Result<(), String> {
    let catalog = Catalog::builder(transport)
        .proxy(config.proxy.clone())
        .build();
    catalog
        .add_config(base_catalog(read_json(catalog_path)?)?)
        .await
        .map_err(|e| e.to_string())?;

    let decoded = decode(uri, &config.param_whitelist).map_err(|e| e.to_string())?;
    // Init files named in the link come before the link's own sources.
    let mut combined = ShareDocument::new(
        decoded
            .init_file_urls(&config.app_url)
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(InitSource::Url)
            .collect(),
    );
    let document = resolve(&decoded, Some(service as &dyn ShortLinkService))
        .await
        .map_err(|e| e.to_string())?;
    if let Some(document) = document {
        combined.version = document.version;
        combined.init_sources.extend(document.init_sources);
    }

    let mut view = ViewState::default();
    let report = replay(&combined, &catalog, &mut view)
        .await
        .map_err(|e| e.to_string())?;
    info!(
        added = report.added.len(),
        unresolved = report.unresolved.len(),
        "link replayed"
    );
    for key in &report.unresolved {
        eprintln!("warning: no catalog member for {key}");
    }
    for failure in &report.failed {
        eprintln!("warning: {}: {}", failure.key, failure.message);
    }

    let build = catalog.read(|tree| build_share_document(tree, &view));
    for rejection in &build.rejections {
        eprintln!("warning: {} was not shared ({:?})", rejection.name, rejection.reason);
    }
    let value = serde_json::to_value(&build.document).map_err(|e| e.to_string())?;
    print_json(&value)
}
