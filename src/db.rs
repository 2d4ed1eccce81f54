use anyhow::{Context, Result};
use rusqlite::{params, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use tokio_rusqlite::Connection;

#[derive(Clone)]
pub struct Db {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    Video,
    VideoNote,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Video => "video",
            VideoKind::VideoNote => "video_note",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "video_note" => VideoKind::VideoNote,
            _ => VideoKind::Video,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub file_id: String,
    pub file_unique_id: String,
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub caption: Option<String>,
    pub kind: VideoKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: i64,
    pub file_id: String,
    pub file_unique_id: String,
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub caption: Option<String>,
    pub kind: VideoKind,
    pub date_added: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserVideoStats {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub video_count: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub total_videos: i64,
    pub total_users: i64,
    pub total_chats: i64,
    pub videos_today: i64,
    pub videos_this_week: i64,
    pub videos_this_month: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub traits: Option<String>,
    pub jokes_about: Option<String>,
    pub preferred_name: Option<String>,
    pub favorite_genres: Option<String>,
    pub no_profanity: bool,
    pub created_at: Option<String>,
}

impl UserRecord {
    /// Как обращаться к пользователю: предпочитаемое имя, прозвище, имя, username.
    pub fn display_name(&self) -> Option<&str> {
        self.preferred_name
            .as_deref()
            .or(self.nickname.as_deref())
            .or(self.first_name.as_deref())
            .or(self.username.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub nickname: Option<String>,
    pub video_count: i64,
    pub last_video_date: Option<String>,
    pub created_at: Option<String>,
}

/// Текстовые поля профиля, которые попадают в промпт.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Nickname,
    Description,
    Traits,
    JokesAbout,
}

impl ProfileField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "nickname" | "ник" => Some(ProfileField::Nickname),
            "description" | "описание" => Some(ProfileField::Description),
            "traits" | "черты" => Some(ProfileField::Traits),
            "jokes_about" | "jokes" | "шутки" => Some(ProfileField::JokesAbout),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            ProfileField::Nickname => "nickname",
            ProfileField::Description => "description",
            ProfileField::Traits => "traits",
            ProfileField::JokesAbout => "jokes_about",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyEvent {
    pub id: i64,
    pub name: String,
    pub day: u32,
    pub month: u32,
    pub hour: u32,
    pub minute: u32,
    pub message: String,
    pub music_url: Option<String>,
    pub photo_file_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewYearlyEvent {
    pub name: String,
    pub day: u32,
    pub month: u32,
    pub hour: u32,
    pub minute: u32,
    pub message: String,
    pub music_url: Option<String>,
    pub photo_file_id: Option<String>,
}

/// Частичное обновление события. `None` — колонку не трогаем;
/// для nullable-колонок `Some(None)` записывает NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearlyEventPatch {
    pub name: Option<String>,
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub message: Option<String>,
    pub music_url: Option<Option<String>>,
    pub photo_file_id: Option<Option<String>>,
}

impl YearlyEventPatch {
    fn assignments(self) -> Vec<(&'static str, rusqlite::types::Value)> {
        use rusqlite::types::Value;
        let text = |v: Option<String>| v.map_or(Value::Null, Value::Text);
        let mut out = Vec::new();
        if let Some(v) = self.name {
            out.push(("name", Value::Text(v)));
        }
        if let Some(v) = self.day {
            out.push(("day", Value::Integer(v.into())));
        }
        if let Some(v) = self.month {
            out.push(("month", Value::Integer(v.into())));
        }
        if let Some(v) = self.hour {
            out.push(("hour", Value::Integer(v.into())));
        }
        if let Some(v) = self.minute {
            out.push(("minute", Value::Integer(v.into())));
        }
        if let Some(v) = self.message {
            out.push(("message", Value::Text(v)));
        }
        if let Some(v) = self.music_url {
            out.push(("music_url", text(v)));
        }
        if let Some(v) = self.photo_file_id {
            out.push(("photo_file_id", text(v)));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactSeed {
    pub id: String,
    pub fact_text: String,
    pub roast_text: String,
    pub category: String,
    pub subcategory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRecord {
    pub id: String,
    pub fact_text: String,
    pub roast_text: String,
    pub category: String,
    pub subcategory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactStats {
    pub total_read: i64,
    pub today_read: i64,
    pub favorite_category: Option<String>,
}

const VIDEO_COLUMNS: &str = "id, file_id, file_unique_id, message_id, chat_id, user_id, username, caption, kind, date_added";
const EVENT_COLUMNS: &str = "id, name, day, month, hour, minute, message, music_url, photo_file_id, is_active";
const USER_COLUMNS: &str = "id, username, first_name, nickname, description, traits, jokes_about, preferred_name, favorite_genres, no_profanity, created_at";
const TARGET_CHAT_KEY: &str = "target_chat_id";

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    let kind: String = row.get(8)?;
    Ok(VideoRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        file_unique_id: row.get(2)?,
        message_id: row.get(3)?,
        chat_id: row.get(4)?,
        user_id: row.get(5)?,
        username: row.get(6)?,
        caption: row.get(7)?,
        kind: VideoKind::parse(&kind),
        date_added: row.get(9)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<YearlyEvent> {
    Ok(YearlyEvent {
        id: row.get(0)?,
        name: row.get(1)?,
        day: row.get(2)?,
        month: row.get(3)?,
        hour: row.get(4)?,
        minute: row.get(5)?,
        message: row.get(6)?,
        music_url: row.get(7)?,
        photo_file_id: row.get(8)?,
        is_active: row.get(9)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        nickname: row.get(3)?,
        description: row.get(4)?,
        traits: row.get(5)?,
        jokes_about: row.get(6)?,
        preferred_name: row.get(7)?,
        favorite_genres: row.get(8)?,
        no_profanity: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
        created_at: row.get(10)?,
    })
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<FactRecord> {
    Ok(FactRecord {
        id: row.get(0)?,
        fact_text: row.get(1)?,
        roast_text: row.get(2)?,
        category: row.get(3)?,
        subcategory: row.get(4)?,
    })
}

impl Db {
    /// Открывает (или создаёт) базу SQLite по пути `path` и гарантирует наличие схемы.
    /// Родительская директория создаётся при необходимости.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("не удалось создать директорию для БД: {}", dir.display()))?;
            }
        }
        let conn = Connection::open(path).await?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

    /// Открывает существующую базу только на чтение (для веб-панели). Схему не трогает.
    pub async fn open_read_only(path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .await
            .with_context(|| format!("не удалось открыть БД на чтение: {}", path))?;
        Ok(Self { conn })
    }

    /// База в памяти со схемой — для тестов и пробных запусков.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

    /// Инициализирует схему БД (идемпотентно):
    /// - `settings`        — ключ/значение, хранит `target_chat_id`;
    /// - `users`           — участники чата и их предпочтения;
    /// - `video_messages`  — сохранённые видео и кружочки;
    /// - `yearly_events`   — ежегодные поздравления (удаление = `is_active = 0`);
    /// - `facts_library` / `sent_facts` — факты с подколами и журнал отправки.
    async fn init(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode = WAL;
                    CREATE TABLE IF NOT EXISTS settings (
                        key TEXT PRIMARY KEY,
                        value TEXT
                    );
                    CREATE TABLE IF NOT EXISTS users (
                        id INTEGER PRIMARY KEY,
                        username TEXT,
                        first_name TEXT,
                        nickname TEXT,
                        description TEXT,
                        traits TEXT,
                        jokes_about TEXT,
                        preferred_name TEXT,
                        favorite_genres TEXT,
                        no_profanity BOOLEAN DEFAULT 0,
                        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                    );
                    CREATE TABLE IF NOT EXISTS video_messages (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        file_id TEXT UNIQUE NOT NULL,
                        file_unique_id TEXT UNIQUE NOT NULL,
                        message_id INTEGER NOT NULL,
                        chat_id INTEGER NOT NULL DEFAULT 0,
                        user_id INTEGER NOT NULL,
                        username TEXT,
                        caption TEXT,
                        kind TEXT NOT NULL DEFAULT 'video',
                        date_added TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                    );
                    CREATE TABLE IF NOT EXISTS yearly_events (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL,
                        day INTEGER NOT NULL,
                        month INTEGER NOT NULL,
                        hour INTEGER DEFAULT 10,
                        minute INTEGER DEFAULT 0,
                        message TEXT NOT NULL,
                        music_url TEXT,
                        photo_file_id TEXT,
                        is_active BOOLEAN DEFAULT 1,
                        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                    );
                    CREATE TABLE IF NOT EXISTS facts_library (
                        id TEXT PRIMARY KEY,
                        fact_text TEXT NOT NULL,
                        roast_text TEXT NOT NULL,
                        category TEXT NOT NULL,
                        subcategory TEXT NOT NULL,
                        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                    );
                    CREATE TABLE IF NOT EXISTS sent_facts (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        user_id INTEGER NOT NULL,
                        fact_id TEXT NOT NULL,
                        category TEXT NOT NULL,
                        sent_date TEXT NOT NULL,
                        sent_time TEXT NOT NULL,
                        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ---- settings ----

    /// Возвращает сохранённый `target_chat_id` из таблицы `settings`.
    /// Если ещё не задан — вернёт `Ok(None)`.
    pub async fn get_target_chat(&self) -> Result<Option<i64>> {
        let val: Option<String> = self
            .conn
            .call(|conn| {
                let v = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        [TARGET_CHAT_KEY],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(v)
            })
            .await?;
        Ok(val.and_then(|s| s.parse::<i64>().ok()))
    }

    /// Обновляет или добавляет `target_chat_id` в таблицу `settings`.
    pub async fn set_target_chat(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO settings(key, value) VALUES(?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![TARGET_CHAT_KEY, id.to_string()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ---- users ----

    /// Добавляет пользователя или обновляет его username/имя.
    pub async fn upsert_user(&self, id: i64, username: Option<String>, first_name: Option<String>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users(id, username, first_name) VALUES(?1, ?2, ?3) \
                     ON CONFLICT(id) DO UPDATE SET username = excluded.username, first_name = excluded.first_name",
                    params![id, username, first_name],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        let user = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
                let u = conn.query_row(&sql, [id], user_from_row).optional()?;
                Ok(u)
            })
            .await?;
        Ok(user)
    }

    /// Записывает одно из текстовых полей профиля (`None` стирает значение).
    pub async fn set_profile_field(&self, id: i64, field: ProfileField, value: Option<String>) -> Result<()> {
        let column = field.column();
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT INTO users(id, {column}) VALUES(?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET {column} = excluded.{column}"
                );
                conn.execute(&sql, params![id, value])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_preferred_name(&self, id: i64, name: Option<String>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users(id, preferred_name) VALUES(?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET preferred_name = excluded.preferred_name",
                    params![id, name],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_favorite_genres(&self, id: i64, genres: Option<String>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users(id, favorite_genres) VALUES(?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET favorite_genres = excluded.favorite_genres",
                    params![id, genres],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_no_profanity(&self, id: i64, no_profanity: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users(id, no_profanity) VALUES(?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET no_profanity = excluded.no_profanity",
                    params![id, no_profanity],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Все пользователи с числом видео и датой последнего — для веб-панели.
    pub async fn users_overview(&self) -> Result<Vec<UserOverview>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT u.id, u.username, u.first_name, u.nickname, \
                            COUNT(vm.id) AS video_count, MAX(vm.date_added) AS last_video_date, u.created_at \
                     FROM users u \
                     LEFT JOIN video_messages vm ON vm.user_id = u.id \
                     GROUP BY u.id \
                     ORDER BY video_count DESC, last_video_date DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(UserOverview {
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            nickname: row.get(3)?,
                            video_count: row.get(4)?,
                            last_video_date: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(users)
    }

    // ---- videos ----

    /// Сохраняет видео (`INSERT OR IGNORE`). Возвращает `true`, если запись добавлена,
    /// и `false`, если такой `file_id`/`file_unique_id` уже есть.
    pub async fn save_video_message(&self, video: NewVideo) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO video_messages \
                     (file_id, file_unique_id, message_id, chat_id, user_id, username, caption, kind) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        video.file_id,
                        video.file_unique_id,
                        video.message_id,
                        video.chat_id,
                        video.user_id,
                        video.username,
                        video.caption,
                        video.kind.as_str()
                    ],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(inserted)
    }

    /// Случайное видео (`ORDER BY RANDOM()`), `None` если база пуста.
    pub async fn random_video(&self) -> Result<Option<VideoRecord>> {
        let video = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {VIDEO_COLUMNS} FROM video_messages ORDER BY RANDOM() LIMIT 1");
                let v = conn.query_row(&sql, [], video_from_row).optional()?;
                Ok(v)
            })
            .await?;
        Ok(video)
    }

    pub async fn video_count(&self) -> Result<i64> {
        let n = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM video_messages", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    /// Количество уникальных авторов видео.
    pub async fn total_users(&self) -> Result<i64> {
        let n = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT user_id) FROM video_messages",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    /// Число видео по авторам, по убыванию.
    pub async fn user_stats(&self) -> Result<Vec<UserVideoStats>> {
        let stats = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT v.user_id, MAX(v.username), MAX(u.first_name), COUNT(*) AS video_count \
                     FROM video_messages v \
                     LEFT JOIN users u ON u.id = v.user_id \
                     GROUP BY v.user_id \
                     ORDER BY video_count DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(UserVideoStats {
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            video_count: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(stats)
    }

    /// Видео от новых к старым; `limit = None` — все.
    pub async fn recent_videos(&self, limit: Option<i64>) -> Result<Vec<VideoRecord>> {
        let videos = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {VIDEO_COLUMNS} FROM video_messages ORDER BY date_added DESC, id DESC LIMIT ?1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([limit.unwrap_or(-1)], video_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(videos)
    }

    pub async fn video_by_id(&self, id: i64) -> Result<Option<VideoRecord>> {
        let video = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {VIDEO_COLUMNS} FROM video_messages WHERE id = ?1");
                let v = conn.query_row(&sql, [id], video_from_row).optional()?;
                Ok(v)
            })
            .await?;
        Ok(video)
    }

    /// Сводка для главной страницы панели.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
                Ok(DashboardStats {
                    total_videos: count("SELECT COUNT(*) FROM video_messages")?,
                    total_users: count("SELECT COUNT(DISTINCT user_id) FROM video_messages")?,
                    total_chats: count("SELECT COUNT(DISTINCT chat_id) FROM video_messages")?,
                    videos_today: count(
                        "SELECT COUNT(*) FROM video_messages WHERE date(date_added) = date('now')",
                    )?,
                    videos_this_week: count(
                        "SELECT COUNT(*) FROM video_messages WHERE date(date_added) >= date('now', '-7 days')",
                    )?,
                    videos_this_month: count(
                        "SELECT COUNT(*) FROM video_messages WHERE date(date_added) >= date('now', '-30 days')",
                    )?,
                })
            })
            .await?;
        Ok(stats)
    }

    // ---- yearly events ----

    /// Добавляет ежегодное событие, возвращает его id.
    pub async fn add_yearly_event(&self, event: NewYearlyEvent) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO yearly_events \
                     (name, day, month, hour, minute, message, music_url, photo_file_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        event.name,
                        event.day,
                        event.month,
                        event.hour,
                        event.minute,
                        event.message,
                        event.music_url,
                        event.photo_file_id
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Активные события, упорядоченные по месяцу и дню.
    pub async fn active_yearly_events(&self) -> Result<Vec<YearlyEvent>> {
        let events = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM yearly_events WHERE is_active = 1 ORDER BY month, day, hour, minute"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(events)
    }

    /// Активные события на дату (день, месяц).
    pub async fn yearly_events_on(&self, day: u32, month: u32) -> Result<Vec<YearlyEvent>> {
        let events = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {EVENT_COLUMNS} FROM yearly_events WHERE day = ?1 AND month = ?2 AND is_active = 1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![day, month], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(events)
    }

    /// Событие по id (включая неактивные).
    pub async fn yearly_event(&self, id: i64) -> Result<Option<YearlyEvent>> {
        let event = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {EVENT_COLUMNS} FROM yearly_events WHERE id = ?1");
                let e = conn.query_row(&sql, [id], event_from_row).optional()?;
                Ok(e)
            })
            .await?;
        Ok(event)
    }

    /// Применяет частичное обновление. Возвращает `true`, если строка изменена.
    /// Пустой patch ничего не делает и возвращает `false`.
    pub async fn update_yearly_event(&self, id: i64, patch: YearlyEventPatch) -> Result<bool> {
        let assignments = patch.assignments();
        if assignments.is_empty() {
            return Ok(false);
        }
        let changed = self
            .conn
            .call(move |conn| {
                let set_clause = assignments
                    .iter()
                    .enumerate()
                    .map(|(i, (col, _))| format!("{} = ?{}", col, i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE yearly_events SET {} WHERE id = ?{}",
                    set_clause,
                    assignments.len() + 1
                );
                let mut values: Vec<rusqlite::types::Value> =
                    assignments.into_iter().map(|(_, v)| v).collect();
                values.push(rusqlite::types::Value::Integer(id));
                let n = conn.execute(&sql, rusqlite::params_from_iter(values))?;
                Ok(n > 0)
            })
            .await?;
        Ok(changed)
    }

    /// «Удаляет» событие: выставляет `is_active = 0`, строку не трогает.
    pub async fn deactivate_yearly_event(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE yearly_events SET is_active = 0 WHERE id = ?1 AND is_active = 1",
                    [id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(changed)
    }

    // ---- facts ----

    /// Заполняет библиотеку фактов, если она пуста. Возвращает число вставленных строк.
    pub async fn seed_facts(&self, facts: Vec<FactSeed>) -> Result<usize> {
        let inserted = self
            .conn
            .call(move |conn| {
                let existing: i64 = conn.query_row("SELECT COUNT(*) FROM facts_library", [], |row| row.get(0))?;
                if existing > 0 {
                    return Ok(0);
                }
                let mut stmt = conn.prepare(
                    "INSERT OR IGNORE INTO facts_library (id, fact_text, roast_text, category, subcategory) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                let mut n = 0;
                for f in &facts {
                    n += stmt.execute(params![f.id, f.fact_text, f.roast_text, f.category, f.subcategory])?;
                }
                Ok(n)
            })
            .await?;
        Ok(inserted)
    }

    /// Факты, которые пользователь ещё не видел в день `today` (опционально по подкатегории).
    pub async fn unseen_facts(&self, user_id: i64, subcategory: Option<String>, today: String) -> Result<Vec<FactRecord>> {
        let facts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, fact_text, roast_text, category, subcategory FROM facts_library \
                     WHERE (?1 IS NULL OR subcategory = ?1) \
                       AND id NOT IN (SELECT fact_id FROM sent_facts WHERE user_id = ?2 AND sent_date = ?3) \
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![subcategory, user_id, today], fact_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(facts)
    }

    /// Сбрасывает журнал фактов пользователя за день.
    pub async fn clear_sent_facts(&self, user_id: i64, day: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM sent_facts WHERE user_id = ?1 AND sent_date = ?2",
                    params![user_id, day],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_fact_sent(&self, user_id: i64, fact: &FactRecord, day: String, time: String) -> Result<()> {
        let fact_id = fact.id.clone();
        let category = fact.category.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sent_facts (user_id, fact_id, category, sent_date, sent_time) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![user_id, fact_id, category, day, time],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn fact_stats(&self, user_id: i64, today: String) -> Result<FactStats> {
        let stats = self
            .conn
            .call(move |conn| {
                let total_read: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sent_facts WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )?;
                let today_read: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sent_facts WHERE user_id = ?1 AND sent_date = ?2",
                    params![user_id, today],
                    |row| row.get(0),
                )?;
                let favorite_category: Option<String> = conn
                    .query_row(
                        "SELECT category, COUNT(*) AS n FROM sent_facts WHERE user_id = ?1 \
                         GROUP BY category ORDER BY n DESC, category LIMIT 1",
                        [user_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(FactStats {
                    total_read,
                    today_read,
                    favorite_category,
                })
            })
            .await?;
        Ok(stats)
    }
}
