use anyhow::{Context, Result};
use tracing::info;

use grisha_bot::config::Config;
use grisha_bot::db::Db;
use grisha_bot::logging::init_logging;
use grisha_bot::web::{self, WebState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = Config::load().context("failed to load config")?;
    let db = Db::open_read_only(&config.db_path)
        .await
        .with_context(|| format!("failed to open {} read-only", config.db_path))?;
    info!(db = %config.db_path, "Starting dashboard");

    let state = WebState {
        db,
        db_path: config.db_path.clone(),
        port: config.web_port,
    };
    web::serve(state, &config.web_host).await
}
