use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ensure_success, VendorError};

const SERVICE: &str = "imgflip";
const DEFAULT_API_URL: &str = "https://api.imgflip.com";

/// Шаблоны Imgflip по имени.
const TEMPLATES: &[(&str, u64)] = &[
    ("drake", 181913649),
    ("distracted_boyfriend", 112126428),
    ("woman_yelling_at_cat", 188390779),
    ("two_buttons", 87743020),
    ("change_my_mind", 129242436),
    ("expanding_brain", 93895088),
    ("this_is_fine", 55311130),
    ("stefan", 61579),
    ("hide_the_pain", 27813981),
    ("doge", 8072285),
    ("grumpy_cat", 405658),
    ("success_kid", 61520),
    ("bad_luck_brian", 61585),
    ("first_world_problems", 61532),
    ("y_u_no", 61527),
    ("trollface", 61539),
    ("forever_alone", 61533),
];

struct PersonalSet {
    keywords: &'static [&'static str],
    templates: &'static [&'static str],
    texts: &'static [(&'static str, &'static str)],
}

const PERSONAL: &[PersonalSet] = &[
    PersonalSet {
        keywords: &["вадик", "vadik", "рыбалка", "катер", "дом"],
        templates: &["drake", "two_buttons", "expanding_brain"],
        texts: &[
            ("Рыбалка", "Друзья"),
            ("Купить катер", "Сделать ремонт в доме"),
            ("Бросить курить", "Продолжить курить"),
            ("Ездить на октахе", "Мечтать о катере"),
        ],
    },
    PersonalSet {
        keywords: &["лёха", "леха", "leha", "кальян", "bmw", "никель"],
        templates: &["drake", "distracted_boyfriend", "woman_yelling_at_cat"],
        texts: &[
            ("Кальян", "BMW"),
            ("Жить в Никеле", "Видеть солнце"),
            ("Ходить пешком", "Ездить на BMW"),
            ("Вискарь с колой", "Здоровый образ жизни"),
        ],
    },
    PersonalSet {
        keywords: &["мат", "ругайся", "выругайся", "агрессивный"],
        templates: &["woman_yelling_at_cat", "this_is_fine", "trollface"],
        texts: &[("Мат", "Вежливость"), ("Ругаться", "Молчать"), ("Агрессия", "Спокойствие")],
    },
    PersonalSet {
        keywords: &["шутка", "анекдот", "юмор", "смешно"],
        templates: &["expanding_brain", "two_buttons", "drake"],
        texts: &[
            ("Черный юмор", "Обычные шутки"),
            ("Едкие шутки", "Добрые шутки"),
            ("Сарказм", "Прямота"),
        ],
    },
];

const GRISHA_TEXTS: &[(&str, &str)] = &[
    ("Гриша", "не бот"),
    ("Я просто друг", "который иногда пишет"),
    ("Черный юмор", "мой конек"),
    ("Мат", "это искусство"),
    ("Сарказм", "мой язык"),
];

/// Что именно рисовать: шаблон и две подписи.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemePlan {
    pub template_id: u64,
    pub top: String,
    pub bottom: String,
}

fn template_id(name: &str) -> Option<u64> {
    TEMPLATES.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
}

fn any_template<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    TEMPLATES.choose(rng).map_or(61579, |(_, id)| *id)
}

fn personal_plan<R: Rng + ?Sized>(set: &PersonalSet, rng: &mut R) -> Option<MemePlan> {
    let template = set.templates.choose(rng).and_then(|name| template_id(name))?;
    let (top, bottom) = set.texts.choose(rng)?;
    Some(MemePlan {
        template_id: template,
        top: top.to_string(),
        bottom: bottom.to_string(),
    })
}

/// Мем по ключевым словам сообщения; без совпадений — случайный шаблон с «Гриша шутит».
pub fn plan_for_context<R: Rng + ?Sized>(message: &str, rng: &mut R) -> MemePlan {
    let lower = message.to_lowercase();
    PERSONAL
        .iter()
        .find(|set| set.keywords.iter().any(|k| lower.contains(k)))
        .and_then(|set| personal_plan(set, rng))
        .unwrap_or_else(|| MemePlan {
            template_id: any_template(rng),
            top: "Гриша шутит".to_string(),
            bottom: String::new(),
        })
}

pub fn plan_random<R: Rng + ?Sized>(rng: &mut R) -> MemePlan {
    let template_id = any_template(rng);
    let (top, bottom) = GRISHA_TEXTS.choose(rng).copied().unwrap_or(("Гриша", "не бот"));
    MemePlan {
        template_id,
        top: top.to_string(),
        bottom: bottom.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    success: bool,
    #[serde(default)]
    data: Option<CaptionData>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionData {
    url: String,
}

#[derive(Clone)]
pub struct Imgflip {
    client: reqwest::Client,
    api_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl Imgflip {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            api_url: DEFAULT_API_URL.to_string(),
            username: cfg.imgflip_username.clone(),
            password: cfg.imgflip_password.clone(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// `caption_image`: возвращает URL готовой картинки.
    pub async fn caption(&self, plan: &MemePlan) -> Result<String, VendorError> {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(VendorError::MissingKey { service: SERVICE });
        };
        let template_id = plan.template_id.to_string();
        let form = [
            ("template_id", template_id.as_str()),
            ("username", username.as_str()),
            ("password", password.as_str()),
            ("text0", plan.top.as_str()),
            ("text1", plan.bottom.as_str()),
        ];
        let resp = self
            .client
            .post(format!("{}/caption_image", self.api_url))
            .form(&form)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: CaptionResponse = resp.json().await.map_err(VendorError::http(SERVICE))?;
        match (parsed.success, parsed.data) {
            (true, Some(data)) => {
                info!(template_id = plan.template_id, url = %data.url, "Meme created");
                Ok(data.url)
            }
            _ => {
                let detail = parsed.error_message.unwrap_or_else(|| "success=false".to_string());
                warn!(template_id = plan.template_id, %detail, "Meme creation failed");
                Err(VendorError::malformed(SERVICE, detail))
            }
        }
    }
}
