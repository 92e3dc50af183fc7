use std::env;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;

use contract_admin::{
    auth::password, config::AppConfig, db, file_store::FileStore, reconcile::reconcile,
    storage::connect_storage,
};

const USAGE: &str = "Usage: maintenance reconcile-files [staged-older-than-minutes]\n       maintenance hash-password <password>";
const DEFAULT_STAGING_GRACE_MINUTES: i64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("reconcile-files") => reconcile_files(args.next()).await?,
        Some("hash-password") => {
            let Some(plain) = args.next() else {
                bail!("{USAGE}");
            };
            println!("{}", password::hash_password(&plain)?);
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn reconcile_files(grace: Option<String>) -> Result<()> {
    let minutes = match grace {
        Some(value) => value
            .parse::<i64>()
            .with_context(|| format!("invalid minute count '{value}'"))?,
        None => DEFAULT_STAGING_GRACE_MINUTES,
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        storage_backend = ?config.storage_backend,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let files = FileStore::new(connect_storage(&config).await?);

    let cutoff = (Utc::now() - Duration::minutes(minutes)).naive_utc();
    let report = reconcile(&pool, &files, cutoff)
        .await
        .map_err(|err| anyhow::anyhow!("reconciliation failed: {err}"))?;

    println!(
        "Removed {} staged files, set {} and cleared {} files flags, removed {} orphaned folders.",
        report.staged_files_removed,
        report.flags_set,
        report.flags_cleared,
        report.orphan_folders_removed
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
