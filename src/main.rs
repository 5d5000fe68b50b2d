//! bleepmeta -- operator CLI for the metadata backend.
//!
//! Each invocation runs a single command against the configured engine.
//! Listings are printed as S3 XML; failures are printed as an S3 `<Error>`
//! document and the process exits non-zero.

use std::path::PathBuf;

use bleepmeta::config::{Config, LoggingConfig};
use bleepmeta::metadata::{ListingRequest, MultipartListingRequest};
use bleepmeta::{xml, MetadataBackend, MetadataError};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for bleepmeta.
#[derive(Parser, Debug)]
#[command(
    name = "bleepmeta",
    version,
    about = "S3-style bucket and object metadata over DynamoDB"
)]
struct Cli {
    /// Path to the YAML configuration file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the Prometheus metrics exposition after the command.
    #[arg(long, default_value_t = false)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the metadata tables if they do not exist
    Provision,
    /// Create a bucket record
    CreateBucket {
        bucket: String,
        #[arg(long, default_value = "{}")]
        descriptor: String,
    },
    /// Print a bucket's descriptor
    GetBucket { bucket: String },
    /// Replace a bucket's descriptor
    UpdateBucket { bucket: String, descriptor: String },
    /// Delete a bucket record
    DeleteBucket { bucket: String },
    /// Store an object's descriptor
    PutObject {
        bucket: String,
        key: String,
        descriptor: String,
    },
    /// Print an object's descriptor
    GetObject { bucket: String, key: String },
    /// Delete an object's descriptor
    DeleteObject { bucket: String, key: String },
    /// List objects (ListObjects v1)
    List {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        marker: Option<String>,
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        max_keys: Option<u32>,
    },
    /// List in-progress multipart uploads
    ListUploads {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        key_marker: Option<String>,
        #[arg(long)]
        upload_id_marker: Option<String>,
        #[arg(long)]
        max_uploads: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => bleepmeta::config::load_config(path)?,
        None => Config::default(),
    };
    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    if config.observability.metrics {
        bleepmeta::metrics::init_metrics();
        bleepmeta::metrics::describe_metrics();
    }

    let backend = bleepmeta::metadata::open(&config).await?;
    let outcome = run(&backend, cli.command).await;

    if cli.print_metrics {
        if let Some(text) = bleepmeta::metrics::render_metrics() {
            println!("{}", text);
        }
    }

    if let Err(e) = outcome {
        println!("{}", xml::render_metadata_error(&e));
        std::process::exit(1);
    }
    Ok(())
}

/// Log to stderr so stdout carries only command output.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(backend: &MetadataBackend, command: Commands) -> Result<(), MetadataError> {
    match command {
        Commands::Provision => {
            backend.ensure_schema().await?;
            let tables = backend.tables();
            println!("{}", tables.buckets.name);
            println!("{}", tables.objects.name);
        }
        Commands::CreateBucket { bucket, descriptor } => {
            backend.create_bucket(&bucket, descriptor.into()).await?;
        }
        Commands::GetBucket { bucket } => {
            println!("{}", backend.get_bucket_descriptor(&bucket).await?.as_str());
        }
        Commands::UpdateBucket { bucket, descriptor } => {
            backend
                .update_bucket_descriptor(&bucket, descriptor.into())
                .await?;
        }
        Commands::DeleteBucket { bucket } => {
            backend.delete_bucket(&bucket).await?;
        }
        Commands::PutObject {
            bucket,
            key,
            descriptor,
        } => {
            backend.put_object(&bucket, &key, descriptor.into()).await?;
        }
        Commands::GetObject { bucket, key } => {
            println!("{}", backend.get_object(&bucket, &key).await?.as_str());
        }
        Commands::DeleteObject { bucket, key } => {
            backend.delete_object(&bucket, &key).await?;
        }
        Commands::List {
            bucket,
            prefix,
            marker,
            delimiter,
            max_keys,
        } => {
            let request = ListingRequest {
                prefix,
                marker,
                delimiter,
                max_keys,
            };
            let result = backend.list_objects(&bucket, &request).await?;
            println!("{}", xml::render_list_objects_result(&bucket, &result));
        }
        Commands::ListUploads {
            bucket,
            prefix,
            delimiter,
            key_marker,
            upload_id_marker,
            max_uploads,
        } => {
            let request = MultipartListingRequest {
                prefix,
                delimiter,
                key_marker,
                upload_id_marker,
                max_uploads,
            };
            let result = backend.list_multipart_uploads(&bucket, &request).await?;
            println!(
                "{}",
                xml::render_list_multipart_uploads_result(&bucket, &request, &result)
            );
        }
    }
    Ok(())
}
