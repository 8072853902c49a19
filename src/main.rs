use std::path::PathBuf;

use clap::Parser;
use marginalia::config::{Cli, Config, default_config_dir, default_config_path, load_token};
use marginalia::error::SyncError;
use marginalia::readwise::ReadwiseClient;
use marginalia::state::SyncStateStore;
use marginalia::sync::Syncer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = args
        .config_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let config = Config::load(&config_path)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, path = ?config_path, "failed to load config file");
            std::process::exit(1);
        })
        .apply_cli(&args);

    // Credentials are checked before any filesystem or network work.
    let token = load_token(&default_config_dir()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("Please either:");
        eprintln!("  1. Set the environment variable: export READWISE_TOKEN='your-token-here'");
        eprintln!(
            "  2. Add to {}: READWISE_ACCESS_TOKEN=your-token-here",
            default_config_dir().join(".credentials").display()
        );
        eprintln!("Get your token from: https://readwise.io/access_token");
        std::process::exit(1);
    });

    let store = SyncStateStore::load(&config.state_file).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to load sync state");
        std::process::exit(1);
    });

    let client = ReadwiseClient::new(&config.api_url, &token);
    let mut syncer = Syncer::new(&config, store, &client).dry_run(args.dry_run);

    match syncer.run().await {
        Ok(report) => {
            if args.dry_run {
                println!(
                    "Dry run complete. {} highlights would be uploaded.",
                    report.uploaded
                );
            } else {
                println!("Sync complete! Uploaded {} new highlights.", report.uploaded);
            }
            if report.failed_batches > 0 {
                println!(
                    "{} batches failed and will be retried on the next run.",
                    report.failed_batches
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", marginalia::unpack_error(e.as_ref()));
            if let Some(SyncError::DeviceNotMounted(path)) = e.downcast_ref::<SyncError>() {
                eprintln!(
                    "Please ensure your PocketBook is connected and mounted at {}",
                    path.display()
                );
            }
            std::process::exit(1);
        }
    }
}
