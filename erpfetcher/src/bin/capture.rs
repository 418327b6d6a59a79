use std::{
    fs::{create_dir_all, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use erpfetcher::{ErpFetcher, ErpParams};
use pstorage::{
    fetch::{RecordSource, Resource},
    models::RawRecord,
};
use serde_json::{json, Value as JsonValue};

#[derive(Parser, Debug)]
#[command(
    name = "erpfetcher-capture",
    about = "Capture full ERP records of every synchronized resource as replayable fixtures",
    after_help = "Example:\n  cargo run -p erpfetcher --bin capture -- \\\n    --base-url https://erp.example.com --output-dir fixtures/erp"
)]
struct Args {
    /// Base URL of the ERP instance.
    #[arg(long, env = "ERP_BASE_URL")]
    base_url: String,

    #[arg(long, env = "ERP_API_KEY")]
    api_key: Option<String>,

    #[arg(long, env = "ERP_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Output directory to store captured data.
    #[arg(long, default_value = "captures")]
    output_dir: PathBuf,

    /// Only capture the listed resources (e.g. customer,purchase_order).
    #[arg(long, value_delimiter = ',')]
    resources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let resources = selected_resources(&args.resources)?;

    let mut params = ErpParams::new(args.base_url.clone());
    params.api_key = args.api_key;
    params.api_secret = args.api_secret;
    let fetcher =
        ErpFetcher::with_default_client(params).context("failed to initialize ERP client")?;

    create_dir_all(&args.output_dir).context("failed to create output directory")?;

    for resource in &resources {
        log::info!("Capturing {} …", resource.doctype());
        let records = capture_resource(&fetcher, *resource).await?;
        let path = args.output_dir.join(format!("{}.json", resource.key()));
        write_json(&path, &records)?;
        log::info!("Wrote {} record(s) to {:?}", records.len(), path);
    }

    let metadata = json!({
        "source": fetcher.name(),
        "base_url": args.base_url,
        "captured_at": Utc::now().to_rfc3339(),
        "resources": resources.iter().map(|r| r.key()).collect::<Vec<_>>(),
    });
    write_json(&args.output_dir.join("metadata.json"), &metadata)?;
    log::info!("Capture finished successfully");
    Ok(())
}

fn selected_resources(keys: &[String]) -> Result<Vec<Resource>> {
    if keys.is_empty() {
        return Ok(Resource::ALL.to_vec());
    }
    keys.iter()
        .map(|key| {
            Resource::ALL
                .into_iter()
                .find(|resource| resource.key() == key.trim())
                .with_context(|| format!("unknown resource '{key}'"))
        })
        .collect()
}

async fn capture_resource(fetcher: &ErpFetcher, resource: Resource) -> Result<Vec<JsonValue>> {
    let listed = fetcher
        .fetch_collection(resource)
        .await
        .with_context(|| format!("failed to list {}", resource.doctype()))?;
    if !resource.needs_detail() {
        return Ok(listed.into_iter().map(JsonValue::Object).collect());
    }

    let mut records = Vec::with_capacity(listed.len());
    for entry in listed {
        let Some(name) = entry.get("name").and_then(JsonValue::as_str) else {
            log::warn!("Skipping {} entry without a name", resource.doctype());
            continue;
        };
        let detail: RawRecord = fetcher
            .fetch_detail(resource, name)
            .await
            .with_context(|| format!("failed to load {} '{}'", resource.doctype(), name))?;
        records.push(JsonValue::Object(detail));
    }
    Ok(records)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {:?}", path))
}
