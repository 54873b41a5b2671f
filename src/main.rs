use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s3link::config;
use s3link::s3::{Acl, PutOptions, S3Client, StorageClass};

mod cli;

use cli::args::{parse_metadata, parse_s3_path};
use cli::commands;

#[derive(Parser)]
#[command(name = "s3link")]
#[command(version, about = "S3 client over raw HTTP with SigV4/SigV2 signing and multipart uploads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to AWS_* / S3_* environment variables)
    #[arg(long, global = true, env = "S3LINK_CONFIG")]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true, env = "S3LINK_PROFILE")]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Multipart part size in MiB
    #[arg(long, global = true)]
    part_size: Option<usize>,

    /// Parallel part uploads
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// List objects (like mc ls)
    Ls {
        /// S3 path (s3://bucket/prefix/)
        path: String,

        /// List recursively
        #[arg(short, long)]
        recursive: bool,

        /// Maximum number of results to show (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_keys: usize,
    },

    /// Download an object
    Get {
        /// S3 path (s3://bucket/key)
        source: String,

        /// Local file or directory; stdout when omitted or `-`
        destination: Option<String>,
    },

    /// Upload a file; multipart above the configured threshold
    Put {
        /// Local file, or `-` for stdin
        source: String,

        /// S3 path (s3://bucket/key or s3://bucket/prefix/)
        destination: String,

        #[arg(long)]
        content_type: Option<String>,

        /// Canned ACL (private, public-read, ...)
        #[arg(long)]
        acl: Option<Acl>,

        /// Storage class (STANDARD, STANDARD_IA, ...)
        #[arg(long)]
        storage_class: Option<StorageClass>,

        /// User metadata as name=value, repeatable
        #[arg(long = "meta", value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },

    /// Remove an object
    Rm {
        /// S3 path to remove
        path: String,
    },

    /// Show object info
    Stat {
        /// S3 path
        path: String,
    },

    /// Print a pre-signed URL
    Presign {
        /// S3 path
        path: String,

        /// Validity in seconds (at most 7 days)
        #[arg(long, default_value = "3600")]
        expires: u64,

        /// HTTP method the URL grants
        #[arg(long, default_value = "GET")]
        method: Method,
    },

    /// Show the region a bucket lives in
    Location {
        /// Bucket name (bucket or s3://bucket/)
        bucket: String,
    },

    /// List buckets
    Buckets,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Requests run one after another, except multipart parts which are
    // multiplexed on this thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Load configuration
    let file = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    let profile = file
        .get_profile(cli.profile.as_deref())
        .context("No profile configured")?;
    let default_bucket = profile.bucket.as_deref();

    let mut multipart = file.multipart.to_multipart_config()?;
    if let Some(mb) = cli.part_size {
        let bytes = mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("--part-size {} MiB is too large", mb))?;
        multipart = multipart.with_part_size(bytes);
    }
    if let Some(concurrency) = cli.concurrency {
        multipart = multipart.with_concurrency(concurrency);
    }

    let client = S3Client::new(profile.to_configuration()?)?.with_multipart_config(multipart);
    tracing::debug!(config = ?client.config(), multipart = ?client.multipart_config(), "client ready");

    match cli.command {
        Commands::Ls {
            path,
            recursive,
            max_keys,
        } => {
            let path = parse_s3_path(&path, default_bucket)?;
            commands::cmd_ls(&client, &path, recursive, max_keys).await?;
        }
        Commands::Get {
            source,
            destination,
        } => {
            let source = parse_s3_path(&source, default_bucket)?;
            commands::cmd_get(&client, &source, destination.as_deref()).await?;
        }
        Commands::Put {
            source,
            destination,
            content_type,
            acl,
            storage_class,
            metadata,
        } => {
            let destination = parse_s3_path(&destination, default_bucket)?;
            let options = PutOptions {
                content_type,
                acl,
                storage_class,
                metadata: metadata.into_iter().collect(),
            };
            commands::cmd_put(&client, &source, &destination, &options).await?;
        }
        Commands::Rm { path } => {
            let path = parse_s3_path(&path, default_bucket)?;
            commands::cmd_rm(&client, &path).await?;
        }
        Commands::Stat { path } => {
            let path = parse_s3_path(&path, default_bucket)?;
            commands::cmd_stat(&client, &path).await?;
        }
        Commands::Presign {
            path,
            expires,
            method,
        } => {
            let path = parse_s3_path(&path, default_bucket)?;
            commands::cmd_presign(&client, &path, method, expires)?;
        }
        Commands::Location { bucket } => {
            let bucket = match parse_s3_path(&bucket, None) {
                Ok(path) => path.bucket,
                Err(_) => bucket,
            };
            commands::cmd_location(&client, &bucket).await?;
        }
        Commands::Buckets => {
            commands::cmd_buckets(&client).await?;
        }
    }

    Ok(())
}
