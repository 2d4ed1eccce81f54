use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfanityLevel {
    #[default]
    Soft,
    Hard,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Male,
    Female,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(alias = "TELOXIDE_TOKEN")]
    pub teloxide_token: String,
    #[serde(alias = "DB_PATH", default = "default_db_path")]
    pub db_path: String,
    #[serde(alias = "TARGET_CHAT_ID", default, deserialize_with = "flexible::opt_number")]
    pub target_chat_id: Option<i64>,
    #[serde(alias = "ADMIN_IDS", default, deserialize_with = "flexible::id_list")]
    pub admin_ids: Vec<i64>,
    #[serde(alias = "YANDEX_API_KEY")]
    pub yandex_api_key: Option<String>,
    #[serde(alias = "YANDEX_FOLDER_ID")]
    pub yandex_folder_id: Option<String>,
    #[serde(alias = "ALLOW_PROFANITY", default = "default_true", deserialize_with = "flexible::boolean")]
    pub allow_profanity: bool,
    #[serde(alias = "PROFANITY_LEVEL", default)]
    pub profanity_level: ProfanityLevel,
    #[serde(alias = "VOICE_ENABLED", default = "default_true", deserialize_with = "flexible::boolean")]
    pub voice_enabled: bool,
    #[serde(alias = "VOICE_LANGUAGE", default = "default_voice_language")]
    pub voice_language: String,
    #[serde(alias = "VOICE_GENDER", default)]
    pub voice_gender: VoiceGender,
    #[serde(alias = "VOICE_SPEED", default = "default_voice_speed", deserialize_with = "flexible::number")]
    pub voice_speed: f64,
    #[serde(alias = "VOICE_FORMAT", default = "default_voice_format")]
    pub voice_format: String,
    #[serde(alias = "GOOGLE_VISION_API_KEY")]
    pub google_vision_api_key: Option<String>,
    #[serde(alias = "KINOPOISK_API_TOKEN")]
    pub kinopoisk_api_token: Option<String>,
    #[serde(alias = "IMGFLIP_USERNAME")]
    pub imgflip_username: Option<String>,
    #[serde(alias = "IMGFLIP_PASSWORD")]
    pub imgflip_password: Option<String>,
    #[serde(alias = "DAILY_VIDEO_HOUR", default = "default_daily_hour", deserialize_with = "flexible::number")]
    pub daily_video_hour: u8,
    #[serde(alias = "DAILY_VIDEO_MINUTE", default, deserialize_with = "flexible::number")]
    pub daily_video_minute: u8,
    /// `M H D Mo *`; перекрывает `DAILY_VIDEO_HOUR`/`DAILY_VIDEO_MINUTE`.
    #[serde(alias = "DAILY_VIDEO_CRON")]
    pub daily_video_cron: Option<String>,
    #[serde(alias = "RANDOM_REPLY_CHANCE", default = "default_reply_chance", deserialize_with = "flexible::number")]
    pub random_reply_chance: f64,
    #[serde(alias = "ASSETS_DIR", default = "default_assets_dir")]
    pub assets_dir: String,
    #[serde(alias = "WEB_HOST", default = "default_web_host")]
    pub web_host: String,
    #[serde(alias = "WEB_PORT", default = "default_web_port", deserialize_with = "flexible::number")]
    pub web_port: u16,
    /// Смещение от UTC в минутах; без него берётся системный часовой пояс.
    #[serde(alias = "TZ_OFFSET_MINUTES", default, deserialize_with = "flexible::opt_number")]
    pub tz_offset_minutes: Option<i64>,
}

fn default_db_path() -> String {
    "bot_database.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_voice_language() -> String {
    "ru-RU".to_string()
}

fn default_voice_speed() -> f64 {
    1.0
}

fn default_voice_format() -> String {
    "oggopus".to_string()
}

fn default_daily_hour() -> u8 {
    9
}

fn default_reply_chance() -> f64 {
    0.1
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    5001
}

impl Config {
    /// Загружает конфиг: из JSON-файла, если задан `CONFIG_PATH`, иначе из переменных окружения.
    pub fn load() -> Result<Self> {
        match std::env::var("CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => load_config(&path),
            _ => Self::from_env(),
        }
    }

    /// Собирает конфиг из переменных окружения (ключи в верхнем регистре через алиасы).
    pub fn from_env() -> Result<Self> {
        Self::from_pairs(std::env::vars())
    }

    /// Значение `--config-json`: путь к JSON-файлу или сам JSON.
    pub fn from_cli_arg(value: &str) -> Result<Self> {
        if value.trim_start().starts_with('{') {
            Self::from_json_str(value)
        } else {
            load_config(value)
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("некорректный JSON конфигурации")
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
            .context("не удалось разобрать конфигурацию из окружения")
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("не удалось прочитать config: {}", path))?;
    let cfg: Config =
        serde_json::from_str(&raw).with_context(|| format!("некорректный JSON: {}", path))?;
    Ok(cfg)
}

/// Из окружения значения приходят строками, из JSON могут прийти числами.
/// Эти помощники принимают и то и другое.
mod flexible {
    use serde::{de, Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    pub fn number<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Deserialize<'de>,
        T::Err: Display,
    {
        match Raw::<T>::deserialize(d)? {
            Raw::Value(v) => Ok(v),
            Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }

    pub fn opt_number<'de, D>(d: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        number::<D, i64>(d).map(Some)
    }

    pub fn boolean<'de, D>(d: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::<bool>::deserialize(d)? {
            Raw::Value(v) => Ok(v),
            Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(de::Error::custom(format!("не булево значение: {other}"))),
            },
        }
    }

    pub fn id_list<'de, D>(d: D) -> Result<Vec<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::<Vec<i64>>::deserialize(d)? {
            Raw::Value(v) => Ok(v),
            Raw::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<i64>().map_err(de::Error::custom))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_pairs_fill_defaults() {
        let cfg = Config::from_pairs(pairs(&[("TELOXIDE_TOKEN", "123:abc")])).unwrap();
        assert_eq!(cfg.teloxide_token, "123:abc");
        assert_eq!(cfg.db_path, "bot_database.db");
        assert_eq!(cfg.daily_video_hour, 9);
        assert_eq!(cfg.daily_video_minute, 0);
        assert_eq!(cfg.web_port, 5001);
        assert!(cfg.voice_enabled);
        assert_eq!(cfg.profanity_level, ProfanityLevel::Soft);
        assert!(cfg.admin_ids.is_empty());
        assert!(cfg.target_chat_id.is_none());
    }

    #[test]
    fn env_strings_are_parsed() {
        let cfg = Config::from_pairs(pairs(&[
            ("TELOXIDE_TOKEN", "t"),
            ("ADMIN_IDS", "1, 2,3"),
            ("TARGET_CHAT_ID", "-1002512455884"),
            ("VOICE_ENABLED", "off"),
            ("VOICE_GENDER", "female"),
            ("PROFANITY_LEVEL", "hard"),
            ("RANDOM_REPLY_CHANCE", "0.25"),
            ("DAILY_VIDEO_HOUR", "21"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();
        assert_eq!(cfg.admin_ids, vec![1, 2, 3]);
        assert_eq!(cfg.target_chat_id, Some(-1002512455884));
        assert!(!cfg.voice_enabled);
        assert_eq!(cfg.voice_gender, VoiceGender::Female);
        assert_eq!(cfg.profanity_level, ProfanityLevel::Hard);
        assert!((cfg.random_reply_chance - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.daily_video_hour, 21);
        assert!(cfg.is_admin(2));
        assert!(!cfg.is_admin(4));
    }

    #[test]
    fn json_accepts_native_types() {
        let cfg = Config::from_json_str(
            r#"{"teloxide_token":"t","admin_ids":[7],"web_port":8080,"allow_profanity":false}"#,
        )
        .unwrap();
        assert_eq!(cfg.admin_ids, vec![7]);
        assert_eq!(cfg.web_port, 8080);
        assert!(!cfg.allow_profanity);
    }

    #[test]
    fn numbers_accept_json_numbers_and_strings() {
        let native = Config::from_json_str(
            r#"{"teloxide_token":"t","daily_video_hour":7,"voice_speed":1.5,"target_chat_id":-42,"tz_offset_minutes":180}"#,
        )
        .unwrap();
        let text = Config::from_json_str(
            r#"{"teloxide_token":"t","daily_video_hour":" 7","voice_speed":"1.5","target_chat_id":"-42","tz_offset_minutes":"180"}"#,
        )
        .unwrap();
        for cfg in [native, text] {
            assert_eq!(cfg.daily_video_hour, 7);
            assert!((cfg.voice_speed - 1.5).abs() < f64::EPSILON);
            assert_eq!(cfg.target_chat_id, Some(-42));
            assert_eq!(cfg.tz_offset_minutes, Some(180));
        }
        assert!(Config::from_json_str(r#"{"teloxide_token":"t","web_port":"порт"}"#).is_err());
        assert!(Config::from_json_str(r#"{"teloxide_token":"t","voice_enabled":"может"}"#).is_err());
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::from_pairs(pairs(&[("DB_PATH", "x.db")])).is_err());
    }

    #[test]
    fn cli_arg_accepts_inline_json_or_file() {
        let cfg = Config::from_cli_arg(r#"{"teloxide_token":"inline"}"#).unwrap();
        assert_eq!(cfg.teloxide_token, "inline");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"TELOXIDE_TOKEN":"from-file","WEB_PORT":"6000"}"#).unwrap();
        let cfg = Config::from_cli_arg(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.teloxide_token, "from-file");
        assert_eq!(cfg.web_port, 6000);

        assert!(Config::from_cli_arg("/nonexistent/grisha.json").is_err());
    }
}
