use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use time::{Date, Month};
use tracing::{info, warn};

use super::{say, sender_id, AppState};
use crate::db::{NewYearlyEvent, ProfileField, YearlyEvent, YearlyEventPatch};
use crate::scheduler;

const DEFAULT_HOUR: u32 = 10;
const EVENT_PHOTO_COMMAND: &str = "/event_photo";

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Команды администратора:")]
pub enum AdminCommand {
    #[command(description = "добавить событие: название|ДД.ММ|ЧЧ:ММ|текст[|ссылка на музыку]")]
    AddEvent(String),
    #[command(description = "список активных событий")]
    Events,
    #[command(description = "изменить событие: <id> <name|date|time|message|music> <значение>")]
    EditEvent(String),
    #[command(description = "отключить событие: <id>")]
    DelEvent(String),
    #[command(description = "фото к событию: подпись к фото «/event_photo <id>» или «/event_photo <id> none»")]
    EventPhoto(String),
    #[command(description = "сделать этот чат целевым для рассылок")]
    SetChat,
    #[command(description = "отправить событие сюда прямо сейчас: <id>")]
    TestEvent(String),
    #[command(description = "профиль: <user_id> <nickname|description|traits|jokes_about> <текст|none>")]
    Profile(String),
    #[command(description = "какие минусовки лежат для частушек")]
    Backing,
}

pub fn parse_day_month(raw: &str) -> Result<(u32, u32)> {
    let (day, month) = raw
        .trim()
        .split_once('.')
        .ok_or_else(|| anyhow!("дата должна быть в формате ДД.ММ"))?;
    let day: u8 = day.parse().context("день должен быть числом")?;
    let month: u8 = month.parse().context("месяц должен быть числом")?;
    let month_enum = Month::try_from(month).map_err(|_| anyhow!("нет такого месяца: {month}"))?;
    // високосный год, чтобы 29.02 было допустимо
    Date::from_calendar_date(2024, month_enum, day).map_err(|_| anyhow!("нет такой даты: {day}.{month}"))?;
    Ok((day.into(), month.into()))
}

pub fn parse_hour_minute(raw: &str) -> Result<(u32, u32)> {
    let (hour, minute) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("время должно быть в формате ЧЧ:ММ"))?;
    let hour: u32 = hour.parse().context("час должен быть числом")?;
    let minute: u32 = minute.parse().context("минуты должны быть числом")?;
    if hour > 23 || minute > 59 {
        bail!("нет такого времени: {hour}:{minute:02}");
    }
    Ok((hour, minute))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("id должен быть числом, получено: {:?}", raw.trim()))
}

fn optional_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    match raw {
        "" | "none" | "-" => None,
        _ => Some(raw.to_string()),
    }
}

/// `название|ДД.ММ|ЧЧ:ММ|текст[|музыка]`. Пустое время означает 10:00.
pub fn parse_new_event(args: &str) -> Result<NewYearlyEvent> {
    let parts: Vec<&str> = args.split('|').map(str::trim).collect();
    if !(4..=5).contains(&parts.len()) {
        bail!("формат: название|ДД.ММ|ЧЧ:ММ|текст[|ссылка на музыку]");
    }
    let name = parts[0];
    if name.is_empty() {
        bail!("пустое название");
    }
    let (day, month) = parse_day_month(parts[1])?;
    let (hour, minute) = if parts[2].is_empty() {
        (DEFAULT_HOUR, 0)
    } else {
        parse_hour_minute(parts[2])?
    };
    let message = parts[3];
    if message.is_empty() {
        bail!("пустой текст события");
    }
    Ok(NewYearlyEvent {
        name: name.to_string(),
        day,
        month,
        hour,
        minute,
        message: message.to_string(),
        music_url: parts.get(4).and_then(|m| optional_value(m)),
        photo_file_id: None,
    })
}

/// `<id> <поле> <значение>`; поля: name, date, time, message, music.
pub fn parse_edit(args: &str) -> Result<(i64, YearlyEventPatch)> {
    let mut it = args.trim().splitn(3, char::is_whitespace);
    let (Some(id), Some(field), Some(value)) = (it.next(), it.next(), it.next()) else {
        bail!("формат: <id> <name|date|time|message|music> <значение>");
    };
    let id = parse_id(id)?;
    let value = value.trim();
    let mut patch = YearlyEventPatch::default();
    match field.to_lowercase().as_str() {
        "name" => patch.name = Some(value.to_string()),
        "date" => {
            let (day, month) = parse_day_month(value)?;
            patch.day = Some(day);
            patch.month = Some(month);
        }
        "time" => {
            let (hour, minute) = parse_hour_minute(value)?;
            patch.hour = Some(hour);
            patch.minute = Some(minute);
        }
        "message" => patch.message = Some(value.to_string()),
        "music" => patch.music_url = Some(optional_value(value)),
        other => bail!("неизвестное поле: {other}"),
    }
    if matches!(&patch.name, Some(n) if n.is_empty()) || matches!(&patch.message, Some(m) if m.is_empty()) {
        bail!("пустое значение");
    }
    Ok((id, patch))
}

/// `<id>` или `<id> none`. Второе значение: снять фото.
pub fn parse_event_photo(args: &str) -> Result<(i64, bool)> {
    let mut it = args.split_whitespace();
    let id = parse_id(it.next().unwrap_or_default())?;
    match it.next() {
        None => Ok((id, false)),
        Some(flag) if flag.eq_ignore_ascii_case("none") => Ok((id, true)),
        Some(other) => bail!("непонятный аргумент: {other}"),
    }
}

/// Аргументы `/event_photo` из подписи к фото (с `@имя_бота` или без).
pub fn event_photo_caption_args(caption: &str) -> Option<&str> {
    let rest = caption.trim_start().strip_prefix(EVENT_PHOTO_COMMAND)?;
    let rest = match rest.strip_prefix('@') {
        Some(mention) => mention.split_once(char::is_whitespace).map_or("", |(_, tail)| tail),
        None if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        None => return None,
    };
    Some(rest.trim())
}

pub fn parse_profile(args: &str) -> Result<(i64, ProfileField, Option<String>)> {
    let mut it = args.trim().splitn(3, char::is_whitespace);
    let (Some(user), Some(field), Some(value)) = (it.next(), it.next(), it.next()) else {
        bail!("формат: <user_id> <nickname|description|traits|jokes_about> <текст|none>");
    };
    let user = parse_id(user)?;
    let field = ProfileField::parse(field).ok_or_else(|| anyhow!("неизвестное поле профиля: {field}"))?;
    Ok((user, field, optional_value(value)))
}

pub fn format_event(e: &YearlyEvent) -> String {
    let mut line = format!(
        "#{} {} · {:02}.{:02} {:02}:{:02}",
        e.id, e.name, e.day, e.month, e.hour, e.minute
    );
    if e.music_url.is_some() {
        line.push_str(" 🎵");
    }
    if e.photo_file_id.is_some() {
        line.push_str(" 🖼️");
    }
    line
}

pub fn format_events(events: &[YearlyEvent]) -> String {
    if events.is_empty() {
        return "Событий нет. Добавь: /add_event название|ДД.ММ|ЧЧ:ММ|текст".to_string();
    }
    let lines: Vec<String> = events.iter().map(format_event).collect();
    format!("📅 Активные события:\n{}", lines.join("\n"))
}

pub fn format_catalogue(catalogue: &BTreeMap<&'static str, Vec<PathBuf>>) -> String {
    if catalogue.is_empty() {
        return "Минусовок нет. Положи mp3/wav/ogg в assets/backing.".to_string();
    }
    let mut text = String::from("🎹 Минусовки:");
    for (kind, files) in catalogue {
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        text.push_str(&format!("\n{kind}: {}", names.join(", ")));
    }
    text
}

pub async fn handle(bot: Bot, msg: Message, cmd: AdminCommand, state: Arc<AppState>) -> Result<()> {
    let user_id = sender_id(&msg);
    info!(chat_id = %msg.chat.id, ?user_id, command = ?cmd, "Admin command received");
    if !state.is_admin(&msg) {
        warn!(chat_id = %msg.chat.id, ?user_id, "Admin command from non-admin");
        say(&bot, msg.chat.id, "⛔ Это только для админов.").await;
        return Ok(());
    }
    match execute(&bot, &msg, cmd, &state).await {
        Ok(Some(reply)) => say(&bot, msg.chat.id, reply).await,
        Ok(None) => {}
        Err(err) => {
            warn!(chat_id = %msg.chat.id, error = %err, "Admin command failed");
            say(&bot, msg.chat.id, format!("❌ {err:#}")).await;
        }
    }
    Ok(())
}

async fn execute(bot: &Bot, msg: &Message, cmd: AdminCommand, state: &AppState) -> Result<Option<String>> {
    let db = &state.db;
    let reply = match cmd {
        AdminCommand::AddEvent(args) => {
            let event = parse_new_event(&args)?;
            let (name, day, month) = (event.name.clone(), event.day, event.month);
            let id = db.add_yearly_event(event).await?;
            info!(event_id = id, %name, "Yearly event added");
            format!("✅ Событие #{id} «{name}» добавлено на {day:02}.{month:02}")
        }
        AdminCommand::Events => format_events(&db.active_yearly_events().await?),
        AdminCommand::EditEvent(args) => {
            let (id, patch) = parse_edit(&args)?;
            if !db.update_yearly_event(id, patch).await? {
                bail!("событие #{id} не найдено");
            }
            format!("✅ Событие #{id} обновлено")
        }
        AdminCommand::DelEvent(args) => {
            let id = parse_id(&args)?;
            if !db.deactivate_yearly_event(id).await? {
                bail!("событие #{id} не найдено");
            }
            format!("✅ Событие #{id} отключено")
        }
        AdminCommand::EventPhoto(args) => {
            let (id, remove) = parse_event_photo(&args)?;
            if !remove {
                return Ok(Some(format!(
                    "Пришли фото с подписью «/event_photo {id}», чтобы привязать его к событию."
                )));
            }
            set_event_photo(state, id, None).await?;
            format!("✅ Фото у события #{id} убрано")
        }
        AdminCommand::SetChat => {
            db.set_target_chat(msg.chat.id.0).await?;
            info!(chat_id = %msg.chat.id, "Target chat set");
            format!("✅ Этот чат ({}) теперь получает видео и события", msg.chat.id)
        }
        AdminCommand::TestEvent(args) => {
            let id = parse_id(&args)?;
            let event = db
                .yearly_event(id)
                .await?
                .ok_or_else(|| anyhow!("событие #{id} не найдено"))?;
            scheduler::send_event(bot, msg.chat.id, &event).await?;
            return Ok(None);
        }
        AdminCommand::Profile(args) => {
            let (user, field, value) = parse_profile(&args)?;
            let cleared = value.is_none();
            db.set_profile_field(user, field, value).await?;
            if cleared {
                format!("✅ Поле {} у {user} очищено", field.column())
            } else {
                format!("✅ Поле {} у {user} обновлено", field.column())
            }
        }
        AdminCommand::Backing => format_catalogue(&state.mixer.backing_catalogue().await?),
    };
    Ok(Some(reply))
}

async fn set_event_photo(state: &AppState, id: i64, photo: Option<String>) -> Result<()> {
    let patch = YearlyEventPatch {
        photo_file_id: Some(photo),
        ..YearlyEventPatch::default()
    };
    if !state.db.update_yearly_event(id, patch).await? {
        bail!("событие #{id} не найдено");
    }
    Ok(())
}

/// Фото с подписью `/event_photo <id>`. Возвращает `false`, если подпись не про это.
pub async fn attach_photo_from_caption(bot: &Bot, msg: &Message, state: &AppState) -> Result<bool> {
    let Some(args) = msg.caption().and_then(event_photo_caption_args) else {
        return Ok(false);
    };
    if !state.is_admin(msg) {
        say(bot, msg.chat.id, "⛔ Это только для админов.").await;
        return Ok(true);
    }
    let photo = msg
        .photo()
        .and_then(|sizes| sizes.iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height)))
        .map(|p| p.file.id.to_string());
    let result = async {
        let (id, remove) = parse_event_photo(args)?;
        let photo = if remove { None } else { photo };
        set_event_photo(state, id, photo.clone()).await?;
        info!(event_id = id, photo = ?photo, "Yearly event photo updated");
        Ok::<_, anyhow::Error>(match photo {
            Some(_) => format!("✅ Фото привязано к событию #{id}"),
            None => format!("✅ Фото у события #{id} убрано"),
        })
    }
    .await;
    match result {
        Ok(reply) => say(bot, msg.chat.id, reply).await,
        Err(err) => {
            warn!(chat_id = %msg.chat.id, error = %err, "event_photo failed");
            say(bot, msg.chat.id, format!("❌ {err:#}")).await;
        }
    }
    Ok(true)
}
