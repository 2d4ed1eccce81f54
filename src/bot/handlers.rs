use std::sync::Arc;

use anyhow::Result;
use rand::seq::SliceRandom;
use teloxide::prelude::*;
use teloxide::types::{InputFile, PhotoSize, User};
use tracing::{debug, info, warn};

use super::{admin, download, say, sender_id, AppState};
use crate::db::{NewVideo, UserRecord, VideoKind};
use crate::engagement::{self, Engagement, EngagementKind};
use crate::history::HISTORY_LIMIT;
use crate::llm::ReplyRequest;
use crate::logging::compact;
use crate::movies::{self, GENRES};
use crate::photo_comment;

/// Когда YandexGPT молчит.
pub const CANNED_COMMENTS: &[&str] = &[
    "Ну и что? 🤷‍♂️",
    "Понятно... 😏",
    "Круто! 😎",
    "Хм, а что если... 💡",
    "Да, согласен! 😊",
    "Интересно! 🤓",
    "Ага, понял! 👌",
    "Хорошая идея! ✨",
];

const NOT_HEARD: &str = "Не разобрал, что ты там пробубнил. Повтори нормально.";

pub fn canned_comment() -> &'static str {
    CANNED_COMMENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Ну и что? 🤷‍♂️")
}

/// Заметки о собеседнике для промпта; `None`, если заполнять нечем.
pub fn profile_notes(user: &UserRecord) -> Option<String> {
    let fields = [
        ("Прозвище", &user.nickname),
        ("Кто такой", &user.description),
        ("Черты", &user.traits),
        ("Над чем шутить", &user.jokes_about),
        ("Любимые жанры", &user.favorite_genres),
    ];
    let notes: Vec<String> = fields
        .iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{label}: {}", v.trim()))
        })
        .collect();
    (!notes.is_empty()).then(|| notes.join("; "))
}

/// Отвечать ли на обычное сообщение. Явные триггеры идут через вероятность категории,
/// всё прочее (включая просьбы выругаться) через общий фильтр.
fn wants_reply(text: &str, engagement: &Engagement, random_chance: f64) -> bool {
    let mut rng = rand::thread_rng();
    match engagement.kind {
        EngagementKind::Casual => engagement::should_respond(text, random_chance, &mut rng),
        _ => engagement.roll(&mut rng),
    }
}

fn genre_in(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    GENRES.iter().copied().find(|g| lower.contains(g))
}

/// Фильм к разговору о кино: жанр из текста или что попало.
async fn movie_hint(state: &AppState, text: &str) -> Option<String> {
    if !state.movies.is_configured() {
        return None;
    }
    let found = match genre_in(text) {
        Some(genre) => state.movies.by_genre(genre).await.map(|list| list.into_iter().next()),
        None => state.movies.random(None).await.map(Some),
    };
    match found {
        Ok(movie) => movie.as_ref().map(movies::format_movie),
        Err(err) => {
            warn!(error = %err, "Movie hint failed");
            None
        }
    }
}

async fn remember_user(state: &AppState, msg: &Message) -> Result<Option<UserRecord>> {
    let (Some(id), Some(from)) = (sender_id(msg), msg.from.as_ref()) else {
        return Ok(None);
    };
    state
        .db
        .upsert_user(id, from.username.clone(), Some(from.first_name.clone()))
        .await?;
    state.db.get_user(id).await
}

/// Кто пишет: чат и имя из Telegram на случай, если профиля ещё нет.
struct Speaker<'a> {
    chat: i64,
    first_name: Option<&'a str>,
    user: Option<&'a UserRecord>,
}

impl<'a> Speaker<'a> {
    fn of(msg: &'a Message, user: Option<&'a UserRecord>) -> Self {
        Self {
            chat: msg.chat.id.0,
            first_name: msg.from.as_ref().map(|u| u.first_name.as_str()),
            user,
        }
    }
}

/// Реплика Гриши на текст. `forced` означает, что отвечаем без броска кубика.
async fn compose_reply(state: &AppState, speaker: &Speaker<'_>, text: &str, forced: bool) -> Option<String> {
    let chat = speaker.chat;
    let user = speaker.user;
    let recent = state.history.recent(chat, HISTORY_LIMIT);
    state.history.push(chat, text);

    let engagement = engagement::decide(text, &recent, state.config.random_reply_chance);
    if !forced && !wants_reply(text, &engagement, state.config.random_reply_chance) {
        debug!(chat_id = chat, kind = ?engagement.kind, "Staying silent");
        return None;
    }

    let no_profanity = user.is_some_and(|u| u.no_profanity);
    let allow_profanity = state.config.allow_profanity && !no_profanity;
    let username = user.and_then(UserRecord::display_name).or(speaker.first_name);
    let context = state.history.context(chat);
    let request = ReplyRequest {
        message: text,
        context: &context,
        username,
        profile: user.and_then(profile_notes),
        flavor: Some(engagement.flavor()),
        allow_profanity: allow_profanity || (engagement::asks_for_profanity(text) && state.config.allow_profanity),
    };

    let mut reply = match state.gpt.reply(&request).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => canned_comment().to_string(),
        Err(err) => {
            debug!(chat_id = chat, error = %err, "Falling back to canned comment");
            canned_comment().to_string()
        }
    };
    state.history.push(chat, format!("AI: {reply}"));

    if engagement.kind == EngagementKind::Movie || engagement::wants_movie(text) {
        if let Some(hint) = movie_hint(state, text).await {
            reply.push_str("\n\n");
            reply.push_str(&hint);
        }
    }
    info!(chat_id = chat, kind = ?engagement.kind, reply = %compact(&reply, 80), "Replying");
    Some(reply)
}

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(text) = msg.text() else { return Ok(()) };
    // неизвестные команды не обсуждаем
    if text.starts_with('/') {
        return Ok(());
    }
    let user = remember_user(&state, &msg).await?;
    let speaker = Speaker::of(&msg, user.as_ref());
    if let Some(reply) = compose_reply(&state, &speaker, text, false).await {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

#[derive(Debug, PartialEq)]
enum VoiceAnswer {
    NotHeard,
    Silent,
    Voice(Vec<u8>),
    Text(String),
}

/// Распознать, ответить, озвучить. Если озвучка не вышла, ответ уходит текстом.
async fn answer_voice(state: &AppState, speaker: &Speaker<'_>, audio: Vec<u8>) -> VoiceAnswer {
    let text = match state.speech.voice_to_text(audio).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => return VoiceAnswer::NotHeard,
        Err(err) => {
            warn!(chat_id = speaker.chat, error = %err, "Speech recognition failed");
            return VoiceAnswer::NotHeard;
        }
    };
    info!(chat_id = speaker.chat, text = %compact(&text, 80), "Voice recognized");

    let Some(reply) = compose_reply(state, speaker, &text, true).await else {
        return VoiceAnswer::Silent;
    };
    match state.speech.text_to_voice(&reply).await {
        Ok(audio) => VoiceAnswer::Voice(audio),
        Err(err) => {
            warn!(chat_id = speaker.chat, error = %err, "TTS failed, replying with text");
            VoiceAnswer::Text(reply)
        }
    }
}

pub async fn handle_voice(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(voice) = msg.voice() else { return Ok(()) };
    if !state.speech.enabled() {
        debug!(chat_id = %msg.chat.id, "Voice disabled, ignoring voice message");
        return Ok(());
    }
    info!(chat_id = %msg.chat.id, file_id = %voice.file.id, "Voice received");
    let user = remember_user(&state, &msg).await?;
    let audio = download(&bot, voice.file.id.clone()).await?;

    match answer_voice(&state, &Speaker::of(&msg, user.as_ref()), audio).await {
        VoiceAnswer::NotHeard => say(&bot, msg.chat.id, NOT_HEARD).await,
        VoiceAnswer::Silent => {}
        VoiceAnswer::Voice(audio) => {
            bot.send_voice(msg.chat.id, InputFile::memory(audio).file_name("grisha.ogg"))
                .await?;
        }
        VoiceAnswer::Text(reply) => {
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

fn largest(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos
        .iter()
        .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
}

pub async fn handle_photo(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    if admin::attach_photo_from_caption(&bot, &msg, &state).await? {
        return Ok(());
    }
    let Some(best) = msg.photo().and_then(largest) else { return Ok(()) };
    info!(
        chat_id = %msg.chat.id,
        from = ?sender_id(&msg),
        width = best.width,
        height = best.height,
        file_id = %best.file.id,
        "Photo received"
    );
    remember_user(&state, &msg).await?;

    let analysis = if state.vision.is_configured() {
        match download(&bot, best.file.id.clone()).await {
            Ok(bytes) => match state.vision.analyze(&bytes).await {
                Ok(analysis) => Some(analysis),
                Err(err) => {
                    warn!(chat_id = %msg.chat.id, error = %err, "Vision analysis failed");
                    None
                }
            },
            Err(err) => {
                warn!(chat_id = %msg.chat.id, error = %err, "Photo download failed");
                None
            }
        }
    } else {
        None
    };
    if let Some(a) = &analysis {
        debug!(summary = %a.summary(), "Photo analyzed");
    }
    let comment = photo_comment::comment(analysis.as_ref());
    bot.send_message(msg.chat.id, comment).await?;
    Ok(())
}

/// Автор видео в архиве: только настоящий @username, имя берётся из `users`.
fn video_author(from: Option<&User>) -> Option<String> {
    from.and_then(|u| u.username.clone())
}

/// Видео и кружочки просто складываются в архив.
pub async fn handle_video(msg: Message, state: Arc<AppState>) -> Result<()> {
    let (file_id, file_unique_id, kind) = if let Some(video) = msg.video() {
        (video.file.id.to_string(), video.file.unique_id.to_string(), VideoKind::Video)
    } else if let Some(note) = msg.video_note() {
        (note.file.id.to_string(), note.file.unique_id.to_string(), VideoKind::VideoNote)
    } else {
        return Ok(());
    };
    remember_user(&state, &msg).await?;
    let video = NewVideo {
        file_id: file_id.clone(),
        file_unique_id,
        message_id: i64::from(msg.id.0),
        chat_id: msg.chat.id.0,
        user_id: sender_id(&msg).unwrap_or_default(),
        username: video_author(msg.from.as_ref()),
        caption: msg.caption().map(str::to_string),
        kind,
    };
    if state.db.save_video_message(video).await? {
        info!(chat_id = %msg.chat.id, %file_id, kind = kind.as_str(), "Video saved");
    } else {
        debug!(chat_id = %msg.chat.id, %file_id, "Video already in archive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::db::Db;
    use crate::llm::YandexGpt;
    use crate::movies::Kinopoisk;
    use crate::speech::SpeechKit;
    use httpmock::prelude::*;
    use serde_json::json;

    fn user() -> UserRecord {
        UserRecord {
            id: 1,
            username: Some("leha".into()),
            first_name: Some("Лёха".into()),
            nickname: None,
            description: None,
            traits: None,
            jokes_about: None,
            preferred_name: None,
            favorite_genres: None,
            no_profanity: false,
            created_at: None,
        }
    }

    #[test]
    fn empty_profile_has_no_notes() {
        assert_eq!(profile_notes(&user()), None);
        let mut u = user();
        u.traits = Some("  ".into());
        assert_eq!(profile_notes(&u), None);
    }

    #[test]
    fn profile_notes_join_filled_fields() {
        let mut u = user();
        u.nickname = Some("Кальянщик".into());
        u.jokes_about = Some("BMW и Никель".into());
        assert_eq!(
            profile_notes(&u).as_deref(),
            Some("Прозвище: Кальянщик; Над чем шутить: BMW и Никель")
        );
    }

    #[test]
    fn canned_comment_comes_from_table() {
        assert!(CANNED_COMMENTS.contains(&canned_comment()));
    }

    #[test]
    fn genre_detection_in_text() {
        assert_eq!(genre_in("посоветуй какой-нибудь Боевик на вечер"), Some("боевик"));
        assert_eq!(genre_in("что посмотреть?"), None);
    }

    #[test]
    fn persistent_messages_always_get_a_reply() {
        let engagement = engagement::decide("ау", &["ау".into(), "ау".into()], 0.0);
        assert_eq!(engagement.kind, EngagementKind::Persistent);
        assert!(wants_reply("ау", &engagement, 0.0));
    }

    #[test]
    fn casual_chatter_respects_zero_chance() {
        let engagement = engagement::decide("просто так", &[], 0.0);
        assert_eq!(engagement.kind, EngagementKind::Casual);
        assert!(!wants_reply("просто так", &engagement, 0.0));
        assert!(wants_reply("ну выругайся уже", &engagement, 0.0));
    }

    #[test]
    fn largest_photo_wins() {
        let photos: Vec<PhotoSize> = serde_json::from_value(serde_json::json!([
            {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 90, "file_size": 1},
            {"file_id": "big", "file_unique_id": "b", "width": 1280, "height": 960, "file_size": 3},
            {"file_id": "mid", "file_unique_id": "m", "width": 320, "height": 240, "file_size": 2}
        ]))
        .unwrap();
        assert_eq!(largest(&photos).unwrap().file.id.to_string(), "big");
        assert!(largest(&[]).is_none());
    }

    #[test]
    fn video_author_is_never_a_first_name() {
        let named: User = serde_json::from_value(serde_json::json!(
            {"id": 1, "is_bot": false, "first_name": "Лёха", "username": "leha"}
        ))
        .unwrap();
        let anonymous: User = serde_json::from_value(serde_json::json!(
            {"id": 2, "is_bot": false, "first_name": "Вадик"}
        ))
        .unwrap();
        assert_eq!(video_author(Some(&named)).as_deref(), Some("leha"));
        assert_eq!(video_author(Some(&anonymous)), None);
        assert_eq!(video_author(None), None);
    }

    const CHAT: i64 = -100;

    async fn state(server: &MockServer) -> AppState {
        let cfg = Config::from_json_str(
            r#"{"teloxide_token":"t","yandex_api_key":"k","yandex_folder_id":"f","kinopoisk_api_token":"kp"}"#,
        )
        .unwrap();
        let db = Db::open_in_memory().await.unwrap();
        let mut state = AppState::new(cfg, db, Clock::utc());
        state.gpt = YandexGpt::new(&state.config).with_endpoint(server.url("/completion"));
        state.speech = SpeechKit::new(&state.config).with_urls(server.url("/stt"), server.url("/tts"));
        state.movies = Kinopoisk::new(&state.config).with_base_url(server.base_url());
        state
    }

    fn speaker() -> Speaker<'static> {
        Speaker {
            chat: CHAT,
            first_name: Some("Лёха"),
            user: None,
        }
    }

    async fn gpt_answers(server: &MockServer, text: &str) {
        let body = json!({"result": {"alternatives": [{"message": {"role": "assistant", "text": text}}]}});
        server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(200).json_body(body.clone());
            })
            .await;
    }

    #[tokio::test]
    async fn gpt_failure_falls_back_to_canned_comment() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(500).body("boom");
            })
            .await;
        let state = state(&server).await;

        let reply = compose_reply(&state, &speaker(), "как дела", true).await.unwrap();
        assert!(CANNED_COMMENTS.contains(&reply.as_str()), "{reply}");
        assert_eq!(
            state.history.recent(CHAT, HISTORY_LIMIT),
            vec!["как дела".to_string(), format!("AI: {reply}")]
        );
        let context = state.history.context(CHAT);
        assert!(context.starts_with("Пользователь: как дела\n"));
        assert!(context.ends_with(&format!("AI: {reply}")));
    }

    #[tokio::test]
    async fn blank_gpt_answer_is_replaced() {
        let server = MockServer::start_async().await;
        gpt_answers(&server, "   ").await;
        let state = state(&server).await;
        let reply = compose_reply(&state, &speaker(), "ну", true).await.unwrap();
        assert!(CANNED_COMMENTS.contains(&reply.as_str()));
    }

    #[tokio::test]
    async fn movie_talk_gets_a_suggestion() {
        let server = MockServer::start_async().await;
        gpt_answers(&server, "Да ну, опять кино?").await;
        let kp = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1.4/movie").query_param("genres.name", "комедия");
                then.status(200).json_body(json!({"docs": [
                    {"name": "Джентльмены удачи"}, {"name": "Кин-дза-дза!"}, {"name": "Афоня"}
                ]}));
            })
            .await;
        let state = state(&server).await;

        let reply = compose_reply(&state, &speaker(), "какую комедия глянуть?", true)
            .await
            .unwrap();
        kp.assert_async().await;
        assert!(reply.starts_with("Да ну, опять кино?\n\n🎬 Джентльмены удачи"), "{reply}");
        let history = state.history.recent(CHAT, HISTORY_LIMIT);
        assert_eq!(history.last().map(String::as_str), Some("AI: Да ну, опять кино?"));
    }

    #[tokio::test]
    async fn voice_is_answered_with_voice() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/stt").body("OggS");
                then.status(200).json_body(json!({"result": "гриша ты тут"}));
            })
            .await;
        gpt_answers(&server, "Тут я").await;
        let tts = server
            .mock_async(|when, then| {
                when.method(POST).path("/tts").body_includes("text=");
                then.status(200).body(vec![7u8, 7, 7]);
            })
            .await;
        let state = state(&server).await;

        let answer = answer_voice(&state, &speaker(), b"OggS".to_vec()).await;
        tts.assert_async().await;
        assert_eq!(answer, VoiceAnswer::Voice(vec![7, 7, 7]));
        assert_eq!(state.history.recent(CHAT, HISTORY_LIMIT)[0], "гриша ты тут");
    }

    #[tokio::test]
    async fn voice_falls_back_to_text_when_tts_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/stt");
                then.status(200).json_body(json!({"result": "алло"}));
            })
            .await;
        gpt_answers(&server, "Шо надо?").await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tts");
                then.status(503);
            })
            .await;
        let state = state(&server).await;
        let answer = answer_voice(&state, &speaker(), b"OggS".to_vec()).await;
        assert_eq!(answer, VoiceAnswer::Text("Шо надо?".into()));
    }

    #[tokio::test]
    async fn unheard_voice_skips_the_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/stt");
                then.status(200).json_body(json!({"result": ""}));
            })
            .await;
        let gpt = server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(200);
            })
            .await;
        let state = state(&server).await;
        assert_eq!(answer_voice(&state, &speaker(), vec![1]).await, VoiceAnswer::NotHeard);
        gpt.assert_calls_async(0).await;
        assert_eq!(state.history.len(CHAT), 0);
    }
}
