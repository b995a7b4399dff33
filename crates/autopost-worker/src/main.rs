mod db;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use autopost_core::rehost::UploadConfig;
use db::{Db, GEMINI_API_KEY_SETTING};
use serde::Deserialize;
use tracing::{info, warn};
use worker::{Autoposter, StartOutcome, WorkerConfig, DEFAULT_DELAY_SECONDS};

const CATEGORIES_TOML: &str = include_str!("../../../categories.toml");

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Deserialize)]
struct CategoriesFile {
    #[serde(default)]
    categories: Vec<CategoryEntry>,
}

#[derive(Deserialize)]
struct CategoryEntry {
    name: String,
}

fn seed_categories(db: &Db) {
    match db.category_count() {
        Ok(0) => {}
        Ok(_) => return,
        Err(e) => {
            warn!(error = %e, "Failed to count categories, skipping seed");
            return;
        }
    }
    match toml::from_str::<CategoriesFile>(CATEGORIES_TOML) {
        Ok(file) => {
            for entry in &file.categories {
                if let Err(e) = db.insert_category(&entry.name) {
                    warn!(error = %e, name = %entry.name, "Failed to seed category");
                }
            }
            info!(count = file.categories.len(), "Seeded default categories");
        }
        Err(e) => warn!(error = %e, "Failed to parse bundled category list"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "/data/autopost.db".into());
    let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "/data/uploads".into());
    let public_prefix =
        std::env::var("PUBLIC_UPLOAD_URL_PREFIX").unwrap_or_else(|_| "/uploads".into());
    let delay_seconds = std::env::var("AUTOPOSTER_DELAY_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DELAY_SECONDS)
        .max(1);

    let db = Arc::new(Db::open(&db_path).expect("Failed to open SQLite database"));
    seed_categories(&db);

    // An env-provided key is copied into settings; from then on the
    // worker reads the setting, so the key can be rotated at runtime.
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.trim().is_empty() {
            db.put_setting(GEMINI_API_KEY_SETTING, &key)
                .expect("Failed to store generation credential");
        }
    }

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client");

    let worker = Arc::new(Autoposter::new(
        Arc::clone(&db),
        client,
        WorkerConfig {
            delay: Duration::from_secs(delay_seconds),
            upload: UploadConfig {
                dir: upload_dir.into(),
                public_prefix,
            },
        },
    ));

    match worker.start() {
        StartOutcome::Started => {
            info!(db = %db_path, delay_seconds, "Autoposter worker running")
        }
        outcome => {
            warn!(
                ?outcome,
                last_error = ?worker.status().last_error,
                "Autoposter did not start"
            )
        }
    }

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutting down");
    worker.stop().await;
}
