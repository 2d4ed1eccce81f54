use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use time::OffsetDateTime;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::db::{Db, VideoKind, VideoRecord, YearlyEvent};

pub const MEMORY_HEADLINE: &str = "Давайте вспомним, как было круто?";
/// Подпись, которую раньше сохраняли для кружочков вместо настоящей.
const NOTE_PLACEHOLDER: &str = "Видеосообщение-кружочек";
const TICK: Duration = Duration::from_secs(20);

/// Упрощённый cron: `M H D Mo *`, каждое поле — число или `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CronSpec {
    pub minute: Option<u8>,
    pub hour: Option<u8>,
    pub day: Option<u8>,
    pub month: Option<u8>,
}

impl CronSpec {
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self {
            minute: Some(minute),
            hour: Some(hour),
            ..Self::default()
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<_> = s.split_whitespace().collect();
        if parts.len() != 5 {
            anyhow::bail!("cron must have 5 fields");
        }
        if parts[4] != "*" {
            anyhow::bail!("day-of-week is not supported, use '*'");
        }
        Ok(Self {
            minute: parse_field(parts[0], 59)?,
            hour: parse_field(parts[1], 23)?,
            day: parse_field(parts[2], 31)?,
            month: parse_field(parts[3], 12)?,
        })
    }

    pub fn matches(&self, now: OffsetDateTime) -> bool {
        let hit = |field: Option<u8>, value: u8| field.map_or(true, |f| f == value);
        hit(self.minute, now.minute())
            && hit(self.hour, now.hour())
            && hit(self.day, now.day())
            && hit(self.month, u8::from(now.month()))
    }
}

fn parse_field(v: &str, max: u8) -> Result<Option<u8>> {
    if v == "*" {
        return Ok(None);
    }
    let n: u8 = v.parse().with_context(|| format!("invalid number in cron: {v}"))?;
    if n > max {
        anyhow::bail!("cron value {n} out of range (max {max})");
    }
    Ok(Some(n))
}

pub fn daily_spec(cfg: &Config) -> Result<CronSpec> {
    if let Some(expr) = cfg.daily_video_cron.as_deref().filter(|s| !s.trim().is_empty()) {
        return CronSpec::parse(expr);
    }
    let (hour, minute) = (cfg.daily_video_hour, cfg.daily_video_minute);
    if hour > 23 || minute > 59 {
        warn!(hour, minute, "DAILY_VIDEO_HOUR/DAILY_VIDEO_MINUTE out of range");
        anyhow::bail!("daily video time {hour}:{minute:02} is out of range (00:00-23:59)");
    }
    Ok(CronSpec::daily(hour, minute))
}

/// Пропускает повторные тики внутри одной минуты.
#[derive(Debug, Default)]
struct MinuteGate {
    last: Option<(i32, u16, u8, u8)>,
}

impl MinuteGate {
    fn enter(&mut self, now: OffsetDateTime) -> bool {
        let key = (now.year(), now.ordinal(), now.hour(), now.minute());
        if self.last == Some(key) {
            return false;
        }
        self.last = Some(key);
        true
    }
}

/// Подпись к «воспоминанию»: заголовок, автор, исходная подпись.
pub fn memory_caption(video: &VideoRecord) -> String {
    let mut text = MEMORY_HEADLINE.to_string();
    if let Some(username) = video.username.as_deref().filter(|u| !u.is_empty()) {
        text.push_str(&format!("\n\n📹 От: {username}"));
    }
    if let Some(caption) = video
        .caption
        .as_deref()
        .filter(|c| !c.is_empty() && *c != NOTE_PLACEHOLDER)
    {
        text.push_str(&format!("\n💬 {caption}"));
    }
    text
}

pub fn event_text(event: &YearlyEvent) -> String {
    match event.music_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => format!("{}\n\n🎵 {url}", event.message),
        None => event.message.clone(),
    }
}

/// События, которые должны уйти в эту минуту.
pub fn due_events(events: Vec<YearlyEvent>, now: OffsetDateTime) -> Vec<YearlyEvent> {
    events
        .into_iter()
        .filter(|e| {
            e.is_active
                && e.day == u32::from(now.day())
                && e.month == u32::from(u8::from(now.month()))
                && e.hour == u32::from(now.hour())
                && e.minute == u32::from(now.minute())
        })
        .collect()
}

/// Отправляет сохранённое видео или кружочек. У кружочков нет подписи,
/// поэтому текст уходит отдельным сообщением.
pub async fn send_memory_video(bot: &Bot, chat_id: ChatId, video: &VideoRecord) -> Result<()> {
    let caption = memory_caption(video);
    let file = InputFile::file_id(FileId(video.file_id.clone()));
    match video.kind {
        VideoKind::Video => {
            bot.send_video(chat_id, file).caption(caption).await?;
        }
        VideoKind::VideoNote => {
            bot.send_message(chat_id, caption).await?;
            bot.send_video_note(chat_id, file).await?;
        }
    }
    info!(chat_id = %chat_id, file_id = %video.file_id, "Memory video sent");
    Ok(())
}

pub async fn send_event(bot: &Bot, chat_id: ChatId, event: &YearlyEvent) -> Result<()> {
    let text = event_text(event);
    match event.photo_file_id.as_deref().filter(|f| !f.is_empty()) {
        Some(photo) => {
            bot.send_photo(chat_id, InputFile::file_id(FileId(photo.to_string())))
                .caption(text)
                .await?;
        }
        None => {
            bot.send_message(chat_id, text).await?;
        }
    }
    info!(chat_id = %chat_id, event_id = event.id, name = %event.name, "Yearly event sent");
    Ok(())
}

async fn send_daily_video(bot: &Bot, db: &Db) -> Result<()> {
    let Some(chat) = db.get_target_chat().await? else {
        debug!("daily video: target chat not configured, skipping");
        return Ok(());
    };
    if db.video_count().await? == 0 {
        info!("daily video: no videos in database, skipping");
        return Ok(());
    }
    let Some(video) = db.random_video().await? else {
        warn!("daily video: random pick returned nothing");
        return Ok(());
    };
    send_memory_video(bot, ChatId(chat), &video).await
}

async fn send_due_events(bot: &Bot, db: &Db, now: OffsetDateTime) -> Result<()> {
    let events = db
        .yearly_events_on(u32::from(now.day()), u32::from(u8::from(now.month())))
        .await?;
    let due = due_events(events, now);
    if due.is_empty() {
        return Ok(());
    }
    let Some(chat) = db.get_target_chat().await? else {
        warn!(count = due.len(), "yearly events due but target chat not configured");
        return Ok(());
    };
    for event in &due {
        if let Err(err) = send_event(bot, ChatId(chat), event).await {
            warn!(event_id = event.id, error = %err, "yearly event: send failed");
        }
    }
    Ok(())
}

/// Фоновый цикл: раз в 20 секунд сверяет локальное время с расписанием.
/// Каждая минута обрабатывается не больше одного раза.
pub async fn run(bot: Bot, db: Db, daily: CronSpec, clock: Clock) {
    info!(?daily, offset = %clock.offset(), "Scheduler started");
    let mut gate = MinuteGate::default();
    let mut ticker = interval(TICK);
    loop {
        ticker.tick().await;
        let now = clock.now();
        if !gate.enter(now) {
            continue;
        }

        if daily.matches(now) {
            if let Err(err) = send_daily_video(&bot, &db).await {
                warn!(error = %err, "daily video: error");
            }
        }
        if let Err(err) = send_due_events(&bot, &db, now).await {
            warn!(error = %err, "yearly events: error");
        }
    }
}
