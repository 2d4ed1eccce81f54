//! Решает, отвечать ли на сообщение и в каком тоне.
//!
//! Всё здесь — проверки вхождения подстрок по захардкоженным спискам слов
//! плюс бросок монетки. Списки можно менять свободно.

use rand::Rng;

const BOT_MENTIONS: &[&str] = &["гриша", "гриш", "бот", "ai", "ии", "помощник", "ассистент"];
const EMOTIONAL_SIGNALS: &[&str] = &["скучно", "грустно", "устал", "плохо", "отлично", "круто", "весело"];
const SUPPORT_SIGNALS: &[&str] = &["грустно", "устал", "плохо", "тоска", "депрес", "одиноко", "бесит"];
const MOVIE_WORDS: &[&str] = &[
    "фильм", "кино", "посмотреть", "сериал", "комедия", "драма", "триллер", "боевик",
    "фантастика", "ужасы", "детектив", "мелодрама", "мультфильм", "фэнтези",
];
const PROFANITY_REQUESTS: &[&str] = &["выругайся", "матом", "ругнись", "ругайся", "скажи мат"];

/// Сколько раз одно и то же сообщение должно уже встретиться в истории,
/// чтобы считать собеседника настойчивым.
const PERSISTENT_REPEATS: usize = 2;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn draw<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    if !probability.is_finite() {
        return false;
    }
    rng.gen_bool(probability.clamp(0.0, 1.0))
}

/// Быстрая проверка «стоит ли вообще реагировать».
pub fn should_respond<R: Rng + ?Sized>(text: &str, random_chance: f64, rng: &mut R) -> bool {
    let lower = normalize(text);
    if contains_any(&lower, BOT_MENTIONS)
        || contains_any(&lower, EMOTIONAL_SIGNALS)
        || contains_any(&lower, MOVIE_WORDS)
        || contains_any(&lower, PROFANITY_REQUESTS)
        || text.contains('?')
    {
        return true;
    }
    draw(rng, random_chance)
}

pub fn wants_movie(text: &str) -> bool {
    contains_any(&normalize(text), MOVIE_WORDS)
}

pub fn asks_for_profanity(text: &str) -> bool {
    contains_any(&normalize(text), PROFANITY_REQUESTS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementKind {
    Persistent,
    Support,
    Movie,
    Conversation,
    Casual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Engagement {
    pub kind: EngagementKind,
    pub probability: f64,
}

impl Engagement {
    /// Строка, которая вклеивается в системный промпт.
    pub fn flavor(&self) -> &'static str {
        match self.kind {
            EngagementKind::Persistent => {
                "Собеседник повторяет одно и то же уже не первый раз. Ответь с раздражением, но ответь по делу."
            }
            EngagementKind::Support => {
                "Человеку плохо. Поддержи по-дружески, грубовато, без соплей и без нравоучений."
            }
            EngagementKind::Movie => {
                "Разговор про кино. Посоветуй что-нибудь посмотреть и съязви про вкус собеседника."
            }
            EngagementKind::Conversation => {
                "К тебе обратились напрямую или задали вопрос. Ответь коротко, в своём стиле."
            }
            EngagementKind::Casual => "Просто вклинься в разговор короткой подколкой.",
        }
    }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        draw(rng, self.probability)
    }
}

/// Выбирает категорию реакции и вероятность ответа.
/// `recent` — последние строки истории чата (до добавления `text`).
pub fn decide(text: &str, recent: &[String], random_chance: f64) -> Engagement {
    let lower = normalize(text);
    let repeats = recent.iter().filter(|m| normalize(m) == lower).count();

    let (kind, probability) = if !lower.is_empty() && repeats >= PERSISTENT_REPEATS {
        (EngagementKind::Persistent, 1.0)
    } else if contains_any(&lower, SUPPORT_SIGNALS) {
        (EngagementKind::Support, 0.9)
    } else if contains_any(&lower, MOVIE_WORDS) {
        (EngagementKind::Movie, 0.8)
    } else if contains_any(&lower, BOT_MENTIONS) || text.contains('?') {
        (EngagementKind::Conversation, 0.7)
    } else {
        (EngagementKind::Casual, random_chance)
    };
    Engagement { kind, probability }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn always_low() -> StepRng {
        StepRng::new(0, 0)
    }

    fn always_high() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn keywords_trigger_reply_without_dice() {
        let mut rng = always_high();
        assert!(should_respond("Гриша, ты где", 0.0, &mut rng));
        assert!(should_respond("мне скучно", 0.0, &mut rng));
        assert!(should_respond("что посмотреть вечером", 0.0, &mut rng));
        assert!(should_respond("ну выругайся уже", 0.0, &mut rng));
        assert!(should_respond("как дела?", 0.0, &mut rng));
        assert!(!should_respond("купил хлеб", 0.1, &mut rng));
    }

    #[test]
    fn random_chance_decides_plain_text() {
        assert!(should_respond("купил хлеб", 0.1, &mut always_low()));
        assert!(!should_respond("купил хлеб", 0.0, &mut always_low()));
        assert!(!should_respond("купил хлеб", f64::NAN, &mut always_low()));
    }

    #[test]
    fn repeated_text_is_persistent() {
        let recent = vec!["Ответь".to_string(), "AI: нет".to_string(), "ответь ".to_string()];
        let e = decide("ответь", &recent, 0.1);
        assert_eq!(e.kind, EngagementKind::Persistent);
        assert!(e.roll(&mut always_high()));
    }

    #[test]
    fn categories_follow_priority() {
        assert_eq!(decide("мне грустно, что посмотреть?", &[], 0.1).kind, EngagementKind::Support);
        assert_eq!(decide("какой фильм глянуть", &[], 0.1).kind, EngagementKind::Movie);
        assert_eq!(decide("бот, привет", &[], 0.1).kind, EngagementKind::Conversation);
        let casual = decide("купил хлеб", &[], 0.25);
        assert_eq!(casual.kind, EngagementKind::Casual);
        assert!((casual.probability - 0.25).abs() < f64::EPSILON);
        assert!(!casual.flavor().is_empty());
    }

    #[test]
    fn helpers_detect_requests() {
        assert!(wants_movie("Посоветуй КИНО"));
        assert!(!wants_movie("просто текст"));
        assert!(asks_for_profanity("скажи матом"));
    }
}
