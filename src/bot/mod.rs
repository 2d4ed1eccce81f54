//! Telegram-часть: общее состояние и дерево обработчиков.

pub mod admin;
pub mod commands;
pub mod handlers;

use anyhow::Result;
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::audio::AudioMixer;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::Db;
use crate::facts::Facts;
use crate::history::ChatHistory;
use crate::llm::YandexGpt;
use crate::memes::Imgflip;
use crate::movies::Kinopoisk;
use crate::speech::SpeechKit;
use crate::vision::VisionClient;

use self::admin::AdminCommand;
use self::commands::Command;

/// Всё, что нужно обработчикам. Кладётся в зависимости диспетчера как `Arc<AppState>`.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub history: ChatHistory,
    pub gpt: YandexGpt,
    pub speech: SpeechKit,
    pub vision: VisionClient,
    pub movies: Kinopoisk,
    pub memes: Imgflip,
    pub facts: Facts,
    pub mixer: AudioMixer,
    pub clock: Clock,
}

impl AppState {
    pub fn new(config: Config, db: Db, clock: Clock) -> Self {
        Self {
            history: ChatHistory::new(),
            gpt: YandexGpt::new(&config),
            speech: SpeechKit::new(&config),
            vision: VisionClient::new(&config),
            movies: Kinopoisk::new(&config),
            memes: Imgflip::new(&config),
            facts: Facts::new(db.clone(), clock),
            mixer: AudioMixer::new(&config.assets_dir),
            clock,
            config,
            db,
        }
    }

    pub fn is_admin(&self, msg: &Message) -> bool {
        sender_id(msg).is_some_and(|id| self.config.is_admin(id))
    }
}

pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok())
}

/// Команды, потом медиа, потом обычный текст.
pub fn build_handler() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(commands::handle),
        )
        .branch(
            dptree::entry()
                .filter_command::<AdminCommand>()
                .endpoint(admin::handle),
        )
        .branch(
            dptree::filter(|msg: Message| msg.video().is_some() || msg.video_note().is_some())
                .endpoint(handlers::handle_video),
        )
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handlers::handle_photo))
        .branch(dptree::filter(|msg: Message| msg.voice().is_some()).endpoint(handlers::handle_voice))
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handlers::handle_text))
}

/// Скачивает файл Telegram целиком в память.
pub async fn download(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf).await?;
    Ok(buf)
}

/// Ответ «в тред» без лишних проверок: ошибки отправки только логируются.
pub async fn say(bot: &Bot, chat_id: ChatId, text: impl Into<String>) {
    if let Err(err) = bot.send_message(chat_id, text).await {
        tracing::warn!(chat_id = %chat_id, error = %err, "send_message failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_tree_builds() {
        let _ = build_handler();
    }

    #[tokio::test]
    async fn state_wires_clients_from_config() {
        let cfg = Config::from_json_str(
            r#"{"teloxide_token":"t","admin_ids":"1, 2","yandex_api_key":"k","yandex_folder_id":"f"}"#,
        )
        .unwrap();
        let db = Db::open_in_memory().await.unwrap();
        let state = AppState::new(cfg, db, Clock::utc());
        assert!(state.gpt.is_configured());
        assert!(!state.vision.is_configured());
        assert!(!state.memes.is_configured());
        assert!(state.config.is_admin(2));
    }
}
