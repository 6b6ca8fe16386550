use clap::Parser;
use likesync::cfg::Config;
use likesync::storage::{DurableStore, FileDurableStore};
use likesync::sync::reconcile::newest_first;
use likesync::{LikeRecord, StoreError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
struct Cli {
    /// Path to a like store file
    path: PathBuf,
    /// TOML config file; `LIKESYNC_` environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print at most this many records
    #[arg(long)]
    limit: Option<usize>,
    /// Print one JSON object per line
    #[arg(long)]
    json: bool,
}

/// Stored records, newest first.
async fn load_records(path: &Path, watch_capacity: usize) -> Result<Vec<LikeRecord>, StoreError> {
    let store = FileDurableStore::open(path, watch_capacity).await?;
    let mut records = store.all_like_records().await?;
    records.sort_by(newest_first);
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    likesync::utils::tracing::init(config.log_level, config.log_format);

    if !cli.path.exists() {
        warn!(path = %cli.path.display(), "Like store file does not exist");
    }
    let records = load_records(&cli.path, config.sync.watch_capacity).await?;
    let total = records.len();
    let shown = cli.limit.unwrap_or(total).min(total);
    info!(total, shown, "Dumping like store");

    if cli.json {
        for record in &records[..shown] {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    println!("Like Store Dump");
    println!("- File:    {}", cli.path.display());
    println!("- Records: {total}");
    println!("Records:");

    let mut pending = 0;
    for (idx, record) in records[..shown].iter().enumerate() {
        if record.is_pending() {
            pending += 1;
        }
        let when = chrono::DateTime::from_timestamp(record.created_at as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.created_at.to_string());
        println!(
            "- #{idx}: {} <- {} at {when}",
            record.target_event_id, record.reaction_event_id
        );
    }

    if pending > 0 {
        println!("{pending} of the shown records are unpublished offline likes");
    }

    Ok(())
}
