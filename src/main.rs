// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, resolve configuration, hand the
//   request to the UI flow.
// - Returns `anyhow::Result` so every failure prints with its context.

use anyhow::{bail, Context};
use clap::Parser;
use datahub_upload::{config::UploaderConfig, ui, UploadRequest, Uploader};
use std::path::PathBuf;
use std::time::Duration;

/// Upload a file to the data catalog as a new resource.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload.
    file: PathBuf,

    /// Dataset (package) the resource belongs to.
    #[arg(long)]
    package_id: String,

    /// Display name of the resource. Defaults to the file name.
    #[arg(long)]
    name: Option<String>,

    /// Extra form field, repeatable.
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Catalog base URL, e.g. https://datahub.example.org
    #[arg(long)]
    base_url: Option<String>,

    /// API token. Prefer DATAHUB_API_TOKEN or the config file.
    #[arg(long)]
    token: Option<String>,

    /// Config file (JSON). Defaults to <config dir>/datahub-upload/config.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Whole-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Exit with an error when the server answers with a non-2xx status.
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Disable the progress bar.
    #[arg(long, default_value_t = false)]
    no_progress: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = UploaderConfig::load(args.config.as_deref())?;
    if let Some(url) = args.base_url {
        config.base_url = url;
    }
    if let Some(token) = args.token {
        config.api_token = Some(token);
    }
    if let Some(secs) = args.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }

    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Cannot derive a resource name from the file path; pass --name")?,
    };
    let mut request = UploadRequest::new(&args.file, &args.package_id, &name);
    for (key, value) in args.fields {
        request = request.with_field(key, value);
    }

    let uploader = Uploader::new(config)?;
    let result = ui::run_upload(&uploader, &request, !args.no_progress, &mut std::io::stdout())
        .with_context(|| format!("Uploading {}", args.file.display()))?;

    if args.strict && !result.is_success() {
        bail!("Server rejected the upload: {} {}", result.status_code, result.reason);
    }
    Ok(())
}
