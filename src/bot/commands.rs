use std::sync::Arc;

use anyhow::Result;
use rand::seq::SliceRandom;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use super::admin::AdminCommand;
use super::{say, sender_id, AppState};
use crate::audio::MixOptions;
use crate::db::{UserRecord, UserVideoStats};
use crate::movies::{self, Movie, GENRES};
use crate::{chastushka, facts, memes, scheduler};

const MOVIES_PER_REPLY: usize = 3;
const CHASTUSHKA_TOXICITY: u8 = 1;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Что умеет Гриша:")]
pub enum Command {
    #[command(description = "поздороваться")]
    Start,
    #[command(description = "эта справка")]
    Help,
    #[command(description = "случайное видео из архива")]
    Videos,
    #[command(description = "статистика архива")]
    Stats,
    #[command(description = "факт дня с подколом: /fact [животные|наука|история|технологии|еда]")]
    Fact(String),
    #[command(description = "сколько фактов ты уже прочитал")]
    FactStats,
    #[command(description = "что посмотреть: /movie [жанр|настроение|топ [год]|название]")]
    Movie(String),
    #[command(description = "частушка: /chastushka [тема]")]
    Chastushka(String),
    #[command(description = "сказать голосом: /voice <текст>")]
    Voice(String),
    #[command(description = "мем: /meme [о чём]")]
    Meme(String),
    #[command(description = "как к тебе обращаться: /name <имя>")]
    Name(String),
    #[command(description = "любимые жанры через запятую: /genres комедия, боевик")]
    Genres(String),
    #[command(description = "мат в ответах тебе: /profanity on|off")]
    Profanity(String),
}

pub const GREETING: &str = "Здорово, головешки! Я Гриша. Пишите, спрашивайте, кидайте фотки и кружочки, \
                            я всё запомню и припомню. /help — что я умею.";

pub fn format_stats(videos: i64, users: i64, per_user: &[UserVideoStats]) -> String {
    let mut text = format!("📊 Статистика:\n🎬 Видео в архиве: {videos}\n👥 Авторов: {users}");
    if !per_user.is_empty() {
        text.push('\n');
        for s in per_user {
            let name = match (s.username.as_deref(), s.first_name.as_deref()) {
                (Some(u), _) => format!("@{u}"),
                (None, Some(first)) => first.to_string(),
                (None, None) => s.user_id.to_string(),
            };
            text.push_str(&format!("\n{name}: {}", s.video_count));
        }
    }
    text
}

/// Нормализует список жанров; неизвестные возвращаются вторым значением.
pub fn parse_genres(raw: &str) -> (Vec<&'static str>, Vec<String>) {
    let mut known = Vec::new();
    let mut unknown = Vec::new();
    for part in raw.split(',').map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty()) {
        match GENRES.iter().find(|g| **g == part) {
            Some(g) if !known.contains(g) => known.push(*g),
            Some(_) => {}
            None => unknown.push(part),
        }
    }
    (known, unknown)
}

pub fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "on" | "вкл" | "да" | "1" => Some(true),
        "off" | "выкл" | "нет" | "0" => Some(false),
        _ => None,
    }
}

/// Что просили в `/movie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovieAsk {
    Anything,
    Mood(String),
    Genre(&'static str),
    Popular(Option<i32>),
    Title(String),
}

const POPULAR_WORDS: &[&str] = &["топ", "популярное", "top"];

fn parse_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.trim().parse().ok()?;
    (1900..=2100).contains(&year).then_some(year)
}

impl MovieAsk {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if raw.is_empty() {
            MovieAsk::Anything
        } else if let Some(genre) = GENRES.iter().find(|g| **g == raw) {
            MovieAsk::Genre(*genre)
        } else if movies::is_mood(&raw) {
            MovieAsk::Mood(raw)
        } else if let Some(year) = parse_year(&raw) {
            MovieAsk::Popular(Some(year))
        } else if let Some(rest) = POPULAR_WORDS
            .iter()
            .filter_map(|w| raw.strip_prefix(w))
            .find(|rest| rest.is_empty() || rest.starts_with(' '))
        {
            MovieAsk::Popular(parse_year(rest))
        } else {
            MovieAsk::Title(raw)
        }
    }
}

fn favorite_genre(user: Option<&UserRecord>) -> Option<&'static str> {
    let raw = user?.favorite_genres.as_deref()?;
    let (known, _) = parse_genres(raw);
    known.choose(&mut rand::thread_rng()).copied()
}

pub fn format_movies(list: &[Movie]) -> String {
    list.iter()
        .take(MOVIES_PER_REPLY)
        .map(movies::format_movie)
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn movie_reply(state: &AppState, ask: MovieAsk, user: Option<&UserRecord>) -> String {
    if !state.movies.is_configured() {
        return "Кинопоиск не подключён. Смотри в окно, там тоже сериал.".to_string();
    }
    let result = match &ask {
        MovieAsk::Anything => match favorite_genre(user) {
            Some(genre) => state.movies.by_genre(genre).await,
            None => state.movies.random(None).await.map(|m| vec![m]),
        },
        MovieAsk::Genre(genre) => state.movies.by_genre(genre).await,
        MovieAsk::Mood(mood) => state.movies.by_mood(mood).await,
        MovieAsk::Popular(year) => state.movies.popular(*year).await,
        MovieAsk::Title(title) => state.movies.search_by_name(title).await,
    };
    match result {
        Ok(list) if !list.is_empty() => format_movies(&list),
        Ok(_) => {
            let moods: Vec<_> = movies::mood_names().collect();
            format!(
                "Ничего не нашёл. Видимо, про такое кино ещё не сняли.\nПопробуй жанр или настроение: {}",
                moods.join(", ")
            )
        }
        Err(err) => {
            warn!(?ask, error = %err, "Movie lookup failed");
            "Кинопоиск сейчас не отвечает, смотри в потолок.".to_string()
        }
    }
}

async fn send_chastushka(bot: &Bot, chat_id: ChatId, state: &AppState, topic: &str, user: Option<&UserRecord>) -> Result<()> {
    let allow = state.config.allow_profanity && !user.is_some_and(|u| u.no_profanity);
    let text = {
        let mut rng = rand::thread_rng();
        if topic.trim().is_empty() {
            chastushka::random(&mut rng)
        } else {
            chastushka::generate(topic, CHASTUSHKA_TOXICITY, allow, &mut rng)
        }
    };
    bot.send_message(chat_id, format!("🎵 {text}")).await?;
    match state.mixer.chastushka_audio(&text, &MixOptions::default()).await {
        Ok(audio) => {
            bot.send_voice(chat_id, InputFile::memory(audio).file_name("chastushka.ogg"))
                .await?;
        }
        Err(err) => warn!(chat_id = %chat_id, error = %err, "Chastushka audio unavailable, text only"),
    }
    Ok(())
}

async fn speak(state: &AppState, text: &str) -> Option<Vec<u8>> {
    match state.speech.text_to_voice(text).await {
        Ok(audio) => return Some(audio),
        Err(err) => debug!(error = %err, "SpeechKit TTS unavailable, trying gTTS"),
    }
    match state.mixer.voice_only(text).await {
        Ok(audio) => Some(audio),
        Err(err) => {
            warn!(error = %err, "gTTS fallback failed");
            None
        }
    }
}

pub async fn handle(bot: Bot, msg: Message, cmd: Command, state: Arc<AppState>) -> Result<()> {
    let chat_id = msg.chat.id;
    let user_id = sender_id(&msg);
    info!(chat_id = %chat_id, ?user_id, command = ?cmd, "Command received");
    if let (Some(id), Some(from)) = (user_id, msg.from.as_ref()) {
        state
            .db
            .upsert_user(id, from.username.clone(), Some(from.first_name.clone()))
            .await?;
    }
    let user = match user_id {
        Some(id) => state.db.get_user(id).await?,
        None => None,
    };

    match cmd {
        Command::Start => say(&bot, chat_id, GREETING).await,
        Command::Help => {
            let mut text = Command::descriptions().to_string();
            if state.is_admin(&msg) {
                text.push_str("\n\n");
                text.push_str(&AdminCommand::descriptions().to_string());
            }
            say(&bot, chat_id, text).await;
        }
        Command::Videos => match state.db.random_video().await? {
            Some(video) => scheduler::send_memory_video(&bot, chat_id, &video).await?,
            None => say(&bot, chat_id, "Архив пуст. Кидайте видосы, головешки.").await,
        },
        Command::Stats => {
            let text = format_stats(
                state.db.video_count().await?,
                state.db.total_users().await?,
                &state.db.user_stats().await?,
            );
            say(&bot, chat_id, text).await;
        }
        Command::Fact(arg) => {
            let Some(user_id) = user_id else { return Ok(()) };
            let sub = match arg.trim() {
                "" => None,
                raw => match facts::resolve_subcategory(raw) {
                    Some(sub) => Some(sub),
                    None => {
                        let known: Vec<_> = facts::subcategories().collect();
                        say(&bot, chat_id, format!("Таких фактов нет. Есть: {}", known.join(", "))).await;
                        return Ok(());
                    }
                },
            };
            let text = match state.facts.next_for(user_id, sub).await? {
                Some(fact) => facts::format_fact(&fact),
                None => "Факты кончились. Иди почитай книжку.".to_string(),
            };
            say(&bot, chat_id, text).await;
        }
        Command::FactStats => {
            let Some(user_id) = user_id else { return Ok(()) };
            let stats = state.facts.stats(user_id).await?;
            say(&bot, chat_id, facts::format_stats(&stats)).await;
        }
        Command::Movie(arg) => {
            let text = movie_reply(&state, MovieAsk::parse(&arg), user.as_ref()).await;
            say(&bot, chat_id, text).await;
        }
        Command::Chastushka(topic) => send_chastushka(&bot, chat_id, &state, &topic, user.as_ref()).await?,
        Command::Voice(text) => {
            let text = text.trim();
            if text.is_empty() {
                say(&bot, chat_id, "Что сказать-то? /voice <текст>").await;
                return Ok(());
            }
            match speak(&state, text).await {
                Some(audio) => {
                    bot.send_voice(chat_id, InputFile::memory(audio).file_name("voice.ogg"))
                        .await?;
                }
                None => say(&bot, chat_id, format!("Голос сел. Читай сам: {text}")).await,
            }
        }
        Command::Meme(context) => {
            if !state.memes.is_configured() {
                say(&bot, chat_id, "Мемы не подключены. Представь смешную картинку сам.").await;
                return Ok(());
            }
            let plan = {
                let mut rng = rand::thread_rng();
                if context.trim().is_empty() {
                    memes::plan_random(&mut rng)
                } else {
                    memes::plan_for_context(&context, &mut rng)
                }
            };
            match state.memes.caption(&plan).await {
                Ok(url) => match reqwest::Url::parse(&url) {
                    Ok(parsed) => {
                        bot.send_photo(chat_id, InputFile::url(parsed)).await?;
                    }
                    Err(_) => say(&bot, chat_id, url).await,
                },
                Err(err) => {
                    warn!(chat_id = %chat_id, error = %err, "Meme failed");
                    say(&bot, chat_id, "Мем не получился. Жизнь и так смешная.").await;
                }
            }
        }
        Command::Name(name) => {
            let Some(user_id) = user_id else { return Ok(()) };
            let name = name.trim();
            if name.is_empty() {
                state.db.set_preferred_name(user_id, None).await?;
                say(&bot, chat_id, "Ладно, буду звать как придётся.").await;
            } else {
                state.db.set_preferred_name(user_id, Some(name.to_string())).await?;
                say(&bot, chat_id, format!("Окей, {name}. Запомнил.")).await;
            }
        }
        Command::Genres(raw) => {
            let Some(user_id) = user_id else { return Ok(()) };
            let (known, unknown) = parse_genres(&raw);
            if known.is_empty() && unknown.is_empty() {
                state.db.set_favorite_genres(user_id, None).await?;
                say(&bot, chat_id, format!("Жанры сброшены. Доступные: {}", GENRES.join(", "))).await;
                return Ok(());
            }
            if !unknown.is_empty() {
                say(
                    &bot,
                    chat_id,
                    format!("Не знаю жанры: {}. Доступные: {}", unknown.join(", "), GENRES.join(", ")),
                )
                .await;
                return Ok(());
            }
            state.db.set_favorite_genres(user_id, Some(known.join(","))).await?;
            say(&bot, chat_id, format!("Запомнил: {}", known.join(", "))).await;
        }
        Command::Profanity(raw) => {
            let Some(user_id) = user_id else { return Ok(()) };
            match parse_switch(&raw) {
                Some(on) => {
                    state.db.set_no_profanity(user_id, !on).await?;
                    let reply = if on {
                        "Понял, с тобой можно без цензуры."
                    } else {
                        "Ладно, при тебе без мата. Буду культурным, как библиотекарь."
                    };
                    say(&bot, chat_id, reply).await;
                }
                None => say(&bot, chat_id, "Используй: /profanity on или /profanity off").await,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert!(matches!(Command::parse("/start", "grisha_bot"), Ok(Command::Start)));
        assert!(matches!(Command::parse("/factstats", "grisha_bot"), Ok(Command::FactStats)));
        assert!(matches!(
            Command::parse("/movie комедия", "grisha_bot"),
            Ok(Command::Movie(arg)) if arg == "комедия"
        ));
        assert!(matches!(Command::parse("/fact", "grisha_bot"), Ok(Command::Fact(arg)) if arg.is_empty()));
        assert!(Command::parse("/add_event x", "grisha_bot").is_err());
    }

    #[test]
    fn genres_are_normalized() {
        let (known, unknown) = parse_genres("Комедия, боевик ,комедия");
        assert_eq!(known, vec!["комедия", "боевик"]);
        assert!(unknown.is_empty());
        let (_, unknown) = parse_genres("аниме-мюзикл");
        assert_eq!(unknown, vec!["аниме-мюзикл".to_string()]);
    }

    #[test]
    fn switch_values() {
        assert_eq!(parse_switch("ON"), Some(true));
        assert_eq!(parse_switch("выкл"), Some(false));
        assert_eq!(parse_switch("может"), None);
    }

    #[test]
    fn movie_ask_classification() {
        assert_eq!(MovieAsk::parse(""), MovieAsk::Anything);
        assert_eq!(MovieAsk::parse("Драма"), MovieAsk::Genre("драма"));
        let mood = movies::mood_names().next().unwrap();
        assert_eq!(MovieAsk::parse(mood), MovieAsk::Mood(mood.to_string()));
        assert_eq!(MovieAsk::parse("Брат 2"), MovieAsk::Title("брат 2".into()));
        assert_eq!(MovieAsk::parse("топ"), MovieAsk::Popular(None));
        assert_eq!(MovieAsk::parse("топ 2019"), MovieAsk::Popular(Some(2019)));
        assert_eq!(MovieAsk::parse("1999"), MovieAsk::Popular(Some(1999)));
        assert_eq!(MovieAsk::parse("Топор"), MovieAsk::Title("топор".into()));
    }

    #[test]
    fn stats_text() {
        let per_user = vec![
            UserVideoStats {
                user_id: 1,
                username: Some("leha".into()),
                first_name: Some("Лёха".into()),
                video_count: 5,
            },
            UserVideoStats {
                user_id: 3,
                username: None,
                first_name: Some("Вадик".into()),
                video_count: 2,
            },
            UserVideoStats {
                user_id: 2,
                username: None,
                first_name: None,
                video_count: 1,
            },
        ];
        let text = format_stats(8, 3, &per_user);
        assert!(text.contains("Видео в архиве: 8"));
        assert!(text.contains("@leha: 5"));
        assert!(text.contains("\nВадик: 2"));
        assert!(!text.contains("@Вадик"));
        assert!(text.ends_with("\n2: 1"));
    }
}
