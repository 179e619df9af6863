mod coordinator;
mod core;
mod error;
mod logging;
mod services;

use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};
use bytesize::ByteSize;
use clap::Parser;
use tracing::{error, info};

use crate::core::config::{
    self, Config, DEFAULT_ACL, DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE, DEFAULT_REGION,
    DEFAULT_RETRIES,
};
use crate::services::session::{S3Sessions, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "sluice", version, about = "Stream stdin to S3 as a concurrent multipart upload")]
struct Args {
    /// S3 bucket name
    #[arg(long)]
    bucket: String,

    /// S3 key name (use / notation for folders)
    #[arg(long)]
    key: String,

    /// AWS S3 region
    #[arg(long, default_value = DEFAULT_REGION)]
    region: String,

    /// Multipart upload chunk size, e.g. "50MB" or "64MiB"
    #[arg(long, default_value = DEFAULT_CHUNK_SIZE, value_parser = config::parse_size)]
    chunk_size: u64,

    /// Content-type (MIME type) for the new object
    #[arg(long, default_value = DEFAULT_CONTENT_TYPE)]
    mime_type: String,

    /// Expected input size; enables read overflow detection
    #[arg(long, value_parser = config::parse_size)]
    expected_size: Option<u64>,

    /// Canned ACL for the new object
    #[arg(long, default_value = DEFAULT_ACL)]
    acl: String,

    /// Use server side encryption
    #[arg(long)]
    sse: bool,

    /// Attempts permitted per remote operation
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Custom endpoint URL for S3-compatible stores (implies path-style addressing)
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let config = Config {
        bucket: args.bucket,
        key: args.key,
        region: args.region,
        chunk_size: args.chunk_size,
        content_type: args.mime_type,
        expected_size: args.expected_size,
        acl: args.acl,
        sse: args.sse,
        retries: args.retries,
        endpoint: args.endpoint,
    };
    config.validate()?;

    let access_key = env::var("AWS_ACCESS_KEY").unwrap_or_default();
    let secret_key = env::var("AWS_SECRET_KEY").unwrap_or_default();
    if access_key.is_empty() || secret_key.is_empty() {
        bail!("AWS credentials must be passed as environment variables (AWS_ACCESS_KEY, AWS_SECRET_KEY)");
    }

    info!("starting multipart upload");
    info!("region: {}", config.region);
    info!("bucket: {}", config.bucket);
    info!("key: {}", config.key);
    info!("chunk size: {}", ByteSize::b(config.chunk_size));

    let session: Arc<dyn SessionStore> =
        Arc::new(S3Sessions::connect(&config, access_key, secret_key).await);

    match coordinator::run(&config, session, tokio::io::stdin()).await {
        Ok(summary) => {
            info!("total chunks: {}", summary.parts);
            info!(
                "total uploaded: {} ({} bytes)",
                ByteSize::b(summary.bytes),
                summary.bytes
            );
            info!("multipart upload complete");
            Ok(())
        }
        Err(err) => {
            error!("multipart upload failed: {}", err);
            std::process::exit(1);
        }
    }
}
