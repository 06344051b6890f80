//! Workflow configuration.

use clap::Parser;
use std::path::PathBuf;

use crate::blob::BlobNaming;
use crate::models::MetadataSet;

/// Account name of the local storage emulator.
pub const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";

/// Well-known account key of the local storage emulator (base64 encoded).
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob endpoint of the local storage emulator.
pub const DEVELOPMENT_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Connection string selecting the local storage emulator.
pub const DEVELOPMENT_CONNECTION_STRING: &str = "UseDevelopmentStorage=true";

/// REST API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Prefix for generated container and file names.
pub const DEFAULT_NAME_PREFIX: &str = "ViCunha";

/// Text written to the staged file.
pub const DEFAULT_CONTENT: &str = "Hello Ana Paula!";

/// Directory the staged and downloaded files live in.
pub const DEFAULT_LOCAL_DIRECTORY: &str = "./data/";

/// Metadata applied to the container during the run.
pub const DEFAULT_METADATA: [(&str, &str); 2] = [("key1", "a"), ("key2", "b")];

/// Command-line arguments for the lifecycle run.
#[derive(Parser, Debug, Clone)]
#[command(name = "blob-lifecycle")]
#[command(about = "Walk a blob through its lifecycle on Azure Blob Storage")]
#[command(version)]
pub struct Args {
    /// Storage account connection string.
    #[arg(
        long,
        env = "AZURE_STORAGE_CONNECTION_STRING",
        default_value = DEVELOPMENT_CONNECTION_STRING,
        hide_env_values = true
    )]
    pub connection_string: String,

    /// Run against an in-process store instead of a storage service.
    #[arg(long)]
    pub in_memory: bool,

    /// Directory for the staged and downloaded files. Must exist.
    #[arg(long, short = 'l', default_value = DEFAULT_LOCAL_DIRECTORY)]
    pub local_dir: PathBuf,

    /// Prefix for the generated container and file names.
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    pub name_prefix: String,

    /// Text to upload.
    #[arg(long, default_value = DEFAULT_CONTENT)]
    pub content: String,

    /// Container metadata to apply, as key=value. Repeatable.
    #[arg(long = "metadata", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,

    /// Name the blob after the full local path instead of the file name.
    #[arg(long)]
    pub blob_name_from_path: bool,

    /// Page size for blob listings.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,

    /// Wait for Enter after each step.
    #[arg(long, short = 'i')]
    pub interactive: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn default_metadata() -> MetadataSet {
    DEFAULT_METADATA
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Everything a workflow run needs, passed in rather than read from globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the storage account.
    pub connection_string: String,
    /// Use the in-process store; `connection_string` is ignored.
    pub in_memory: bool,
    /// Directory for the staged and downloaded files.
    pub local_dir: PathBuf,
    pub name_prefix: String,
    pub content: String,
    /// Metadata written in the metadata step.
    pub metadata: MetadataSet,
    pub blob_naming: BlobNaming,
    /// Page size for blob listings; the service default when unset.
    pub page_size: Option<u32>,
    /// Block on stdin after each step.
    pub interactive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_string: DEVELOPMENT_CONNECTION_STRING.to_string(),
            in_memory: false,
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIRECTORY),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            content: DEFAULT_CONTENT.to_string(),
            metadata: default_metadata(),
            blob_naming: BlobNaming::FileName,
            page_size: None,
            interactive: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let metadata = if args.metadata.is_empty() {
            default_metadata()
        } else {
            args.metadata.into_iter().collect()
        };
        let blob_naming = if args.blob_name_from_path {
            BlobNaming::FullPath
        } else {
            BlobNaming::FileName
        };

        Self {
            connection_string: args.connection_string,
            in_memory: args.in_memory,
            local_dir: args.local_dir,
            name_prefix: args.name_prefix,
            content: args.content,
            metadata,
            blob_naming,
            page_size: args.page_size,
            interactive: args.interactive,
        }
    }
}
