use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudstore::storage::{ObjectInfo, StorageService, init_storage_client, new_client};
use cloudstore::{config, logger};
use futures::AsyncWriteExt;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "cloudstore", about = "Object storage over GCS and S3-compatible services")]
struct Cli {
    /// Appended to the configured bucket as "{bucket}-{suffix}"
    #[arg(long, global = true, default_value = "", env = "CLOUDSTORE_BUCKET_SUFFIX")]
    bucket_suffix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file under a timestamped name
    Put {
        file: PathBuf,
        /// Name hint; defaults to the file name
        #[arg(short, long)]
        path: Option<String>,
        /// Defaults to a guess from the file extension
        #[arg(long)]
        content_type: Option<String>,
        /// Store under the public path
        #[arg(long)]
        public: bool,
    },
    /// Download an object
    Get {
        name: String,
        /// Output file; defaults to the object's file name
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Show object metadata
    Stat { name: String },
    /// List keys under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Total size of the objects under a prefix
    Du {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy one object
    Cp { src: String, dst: String },
    /// Copy every object under a prefix
    CpPath {
        src: String,
        dst: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move every object under a prefix
    MvFolder { src: String, dst: String },
    /// Delete one object
    Rm { name: String },
    /// Delete everything under a prefix, public copies included
    RmPath { prefix: String },
    /// Delete every object and the bucket
    RmBucket,
    /// Print a pre-signed download URL
    Url { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::load_env_file();
    logger::init();

    init_storage_client()
        .await
        .context("failed to configure storage")?;
    let storage = new_client(&cli.bucket_suffix)
        .await
        .context("failed to initialize storage")?;

    run(storage.as_ref(), cli.command).await
}

async fn run(storage: &dyn StorageService, command: Commands) -> Result<()> {
    match command {
        Commands::Put {
            file,
            path,
            content_type,
            public,
        } => {
            let hint = match path {
                Some(path) => path,
                None => file_name(&file)?,
            };
            let content_type = content_type.unwrap_or_else(|| {
                mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
            let reader = async_fs::File::open(&file)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;

            let info = if public {
                storage
                    .save_public_object(Box::pin(reader), &hint, &content_type)
                    .await?
            } else {
                storage
                    .save_object(Box::pin(reader), &hint, &content_type)
                    .await?
            };
            print_info(&info);
        }
        Commands::Get { name, output } => {
            let object = storage.get_object(&name).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(object.info.file_name()));

            let mut file = async_fs::File::create(&output)
                .await
                .with_context(|| format!("failed to create {}", output.display()))?;
            let written = futures::io::copy(object.reader, &mut file).await?;
            file.flush().await?;
            println!("{} -> {} ({} bytes)", name, output.display(), written);
        }
        Commands::Stat { name } => print_info(&storage.object_info(&name).await?),
        Commands::Ls { prefix, recursive } => {
            for key in storage.list_objects(&prefix, recursive).await? {
                println!("{}", key);
            }
        }
        Commands::Du { prefix, recursive } => {
            println!("{}", storage.folder_size(&prefix, recursive).await?);
        }
        Commands::Cp { src, dst } => print_info(&storage.copy_object(&src, &dst).await?),
        Commands::CpPath {
            src,
            dst,
            recursive,
        } => {
            let copied = storage.copy_path(&src, &dst, recursive).await?;
            println!("copied {} bytes", copied);
        }
        Commands::MvFolder { src, dst } => {
            storage.rename_folder(&src, &dst).await?;
            println!("{} -> {}", src, dst);
        }
        Commands::Rm { name } => storage.delete_object(&name).await?,
        Commands::RmPath { prefix } => {
            let freed = storage.delete_path(&prefix).await?;
            println!("deleted {} bytes", freed);
        }
        Commands::RmBucket => {
            storage.delete_bucket().await?;
            println!("deleted bucket {}", storage.bucket_name());
        }
        Commands::Url { name } => println!("{}", storage.shared_url(&name).await?),
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

fn print_info(info: &ObjectInfo) {
    println!("name:          {}", info.name);
    println!("size:          {}", info.size);
    println!(
        "content type:  {}",
        info.content_type.as_deref().unwrap_or("-")
    );
    println!("etag:          {}", info.etag.as_deref().unwrap_or("-"));
    println!("last modified: {}", info.last_modified.to_rfc3339());
    println!("self link:     {}", info.self_link);
    println!("media link:    {}", info.media_link);
}
