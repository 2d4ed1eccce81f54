use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{info, warn};

use grisha_bot::bot::{build_handler, AppState};
use grisha_bot::clock::Clock;
use grisha_bot::config::Config;
use grisha_bot::db::Db;
use grisha_bot::logging::init_logging;
use grisha_bot::scheduler;

/// `--config-json <значение>` или `--config-json=<значение>`.
fn config_json_arg(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if let Some(rest) = arg.strip_prefix("--config-json=") {
            return Some(rest.to_string());
        }
        if arg == "--config-json" {
            return args.next();
        }
    }
    None
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match config_json_arg(std::env::args().skip(1)) {
        Some(value) => {
            info!("Loading config from --config-json");
            Config::from_cli_arg(&value).context("failed to parse --config-json")?
        }
        None => Config::load().context("failed to load config")?,
    };
    // пока поток один, системный часовой пояс ещё читается
    let clock = Clock::detect(config.tz_offset_minutes).context("invalid TZ_OFFSET_MINUTES")?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?
        .block_on(run(config, clock))
}

async fn run(config: Config, clock: Clock) -> Result<()> {
    let db = Db::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open sqlite db at {}", config.db_path))?;

    // target chat из конфига, если в базе ещё пусто
    if db.get_target_chat().await?.is_none() {
        if let Some(id) = config.target_chat_id {
            db.set_target_chat(id).await?;
            info!(chat_id = id, "Target chat seeded from config");
        }
    }

    let daily = scheduler::daily_spec(&config).context("invalid daily video schedule")?;
    let bot = Bot::new(&config.teloxide_token);
    let state = Arc::new(AppState::new(config, db.clone(), clock));

    state.facts.seed().await.context("failed to seed facts")?;
    if let Err(err) = state.mixer.ensure_dirs().await {
        warn!(error = %err, "Audio directories unavailable, chastushki will be text-only");
    }

    let bot_bg = bot.clone();
    tokio::spawn(async move {
        scheduler::run(bot_bg, db, daily, clock).await;
    });

    match bot.get_me().await {
        Ok(me) => {
            info!(
                id = me.id.0,
                username = me.user.username.as_deref().unwrap_or(""),
                "Bot started"
            );
        }
        Err(err) => warn!(error = %err, "Failed to fetch bot info"),
    }

    Dispatcher::builder(bot, build_handler())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn config_arg_forms() {
        assert_eq!(config_json_arg(args(&["--config-json", "a.json"])).as_deref(), Some("a.json"));
        assert_eq!(config_json_arg(args(&["-v", "--config-json={}"])).as_deref(), Some("{}"));
        assert_eq!(config_json_arg(args(&["--config-json"])), None);
        assert_eq!(config_json_arg(args(&[])), None);
    }
}
