use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stowage::{
    ObjectData, PutOptions, StorageError, StorageProvider, config::BackendConfig,
    localfs::LocalFsProvider,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, level_filters::LevelFilter};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// JSON file describing the backend, e.g. `{"provider":"local-fs","rootDir":"/tmp"}`.
    #[arg(long)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Store an object from a file, inline text, or stdin.
    Put {
        container: String,
        path: String,
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Write an object to stdout.
    Get { container: String, path: String },
    List {
        container: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    Delete { container: String, path: String },
    Containers,
    CreateContainer { container: String },
    DeleteContainer { container: String },
}

#[tokio::main]
async fn main() -> Result<(), StorageError> {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match BackendConfig::load(&args.config).await? {
        BackendConfig::LocalFs(config) => run(LocalFsProvider::new(&config), args.command).await,
        #[cfg(feature = "mongodb")]
        BackendConfig::GridFs(config) => {
            run(stowage::gridfs::GridFsProvider::mongodb(&config), args.command).await
        }
        #[cfg(not(feature = "mongodb"))]
        BackendConfig::GridFs(_) => Err(StorageError::Configuration(
            "gridfs requires the `mongodb` feature".to_string(),
        )),
    }
}

async fn run<P: StorageProvider>(provider: P, command: Commands) -> Result<(), StorageError> {
    info!(provider = provider.provider_name(), "provider ready");

    match command {
        Commands::Put {
            container,
            path,
            file,
            text,
            replace,
        } => {
            let data = match (file, text) {
                (Some(file), _) => ObjectData::stream(tokio::fs::File::open(file).await?),
                (None, Some(text)) => ObjectData::from(text),
                (None, None) => ObjectData::stream(tokio::io::stdin()),
            };
            let options = PutOptions {
                replace,
                ..Default::default()
            };

            provider.put_object(&container, &path, data, options).await?;
            info!(%container, %path, "stored");
        }
        Commands::Get { container, path } => {
            let mut reader = provider
                .get_object(&container, &path)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("{container}/{path}")))?;

            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout)
                .await
                .map_err(StorageError::from_io)?;
            stdout.flush().await?;
        }
        Commands::List { container, prefix } => {
            for object in provider.list_objects(&container, prefix.as_deref()).await? {
                let line = serde_json::to_string(&object)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                println!("{line}");
            }
        }
        Commands::Delete { container, path } => {
            provider.delete_object(&container, &path).await?;
            info!(%container, %path, "deleted");
        }
        Commands::Containers => {
            for name in provider.list_containers().await? {
                println!("{name}");
            }
        }
        Commands::CreateContainer { container } => {
            provider
                .create_container(&container, &Default::default())
                .await?;
        }
        Commands::DeleteContainer { container } => {
            provider.delete_container(&container).await?;
        }
    }

    Ok(())
}
