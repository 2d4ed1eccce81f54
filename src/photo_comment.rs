//! Токсичные комментарии Гриши к фотографиям по результату Vision.
//!
//! Выбор фразы детерминирован содержимым снимка: одно и то же фото всегда
//! получает одну и ту же реплику, разные фото почти всегда разные.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::vision::ImageAnalysis;

pub const NO_ANALYSIS: &str = "Не получилось понять, что на фото. Попробуй другое — и без ужасов, ладно";

const BASE_SALT: u64 = 17;
const TEXT_SALT: u64 = 101;
const SHUFFLE_SALT: u64 = 313;
const BANNED_SALT: u64 = 911;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoType {
    Selfie,
    Group,
    Food,
    Pet,
    Landscape,
    Text,
    Default,
}

const FOOD_KEYWORDS: &[&str] = &["food", "meal", "dish", "restaurant", "cooking", "kitchen", "pizza", "burger", "sandwich"];
const PET_KEYWORDS: &[&str] = &["dog", "cat", "pet", "animal", "puppy", "kitten", "bird", "fish"];
const LANDSCAPE_KEYWORDS: &[&str] = &["landscape", "nature", "mountain", "forest", "beach", "sky", "tree", "water"];

const SELFIE: &[&str] = &[
    "Лицо старается, а харизма — нет",
    "Селфи удалась, вот бы с характером так же",
    "Ты снова смотришь в камеру, как в бездну — и она отвечает взаимностью",
    "Грим, фильтр, надежды — а получилось все равно ты",
    "Снимок уверенный, как твои слабые оправдания",
    "Селфи приличное, хотя твой внутренний редактор опять прогулял",
    "Лицо в кадре одно, а эго на весь экран",
    "Портрет есть, портретности нет. Зато старание заметно",
    "Селфи бодрое, но обаяние еще грузится",
    "Хороший свет. Жаль, что на характер он не влияет",
    "Ракурс ищет тебя лучшего. Пока безуспешно",
    "Настроение на фото — как твой Wi‑Fi: то есть, то нет",
];

const FOOD: &[&str] = &[
    "Еда выглядит так, будто ей страшно оказаться у тебя дома",
    "На тарелке праздник, на душе — студень",
    "Аппетитно. Главное — не испортить разговорами",
    "Красиво подано. Надеюсь, на вкус не как твои идеи",
    "Если это ты готовил — тогда респект тому, кто выжил",
    "Шик, блеск, калории. Твоя совесть уже вышла из чата",
    "Еда топ, репутация под вопросом",
    "Сфоткал, значит съел. Инстинкты сильнее эстетики",
    "Десерт милый. Почти как твои попытки быть серьезным",
    "Композиция сильная, диета сломалась ещё сильнее",
    "Это выглядит вкусно. Жаль, лайки не насыщают",
    "Кулинарный перфоманс уровня: спасайся кто может",
];

const PET: &[&str] = &[
    "Питомец хорош. Ты стараешься не мешать — и это мудро",
    "Животное милое. На его фоне ты почти человек",
    "Кот берет харизмой. Тебе пока не продают",
    "Собака верная. В отличие от твоего режима дня",
    "Зверь очарователен. Постарайся не учить его своим привычкам",
    "Это животное — главная причина, почему фото стоит смотреть",
    "Лапки прекрасные. Хозяин — рабочая версия",
    "Питомец фотогеничен. Ты рядом для масштаба",
    "Хозяин старался, но звезда — не он",
    "Вы оба милые. Он — по факту, ты — по заявке",
    "Пушистик — 10/10. Хозяин — попросим выйти из кадра",
    "Глазки у зверя умные. Возьми контакт тренера",
];

const LANDSCAPE: &[&str] = &[
    "Природа постаралась. Ты пока только сфоткал",
    "Красиво. Даже ты это не испортил — уже достижение",
    "Пейзаж сильный, автор слабее, но амбициозен",
    "Горы держатся молодцом, а ты — за телефон",
    "Спокойный кадр. На твой характер не похоже",
    "Воздух чистый, мысли — посмотрим",
    "Тут красиво без фильтров. Заметил?",
    "Композиция сработала. Теперь бы с жизнью так же",
    "Природа — редактор лучше любого приложения",
    "Пейзаж вдохновляет. Тебе бы тоже начать",
    "Глазам приятно. Эго — помолчи",
    "Место мощное. Ты пока статист",
];

const GROUP: &[&str] = &[
    "Толпа улыбается. Значит, кто-то уже сдался",
    "Групповое фото: все заняты тем, чтобы казаться лучше",
    "Лиц много, внимания мало. Особенно к сути",
    "Дружно стоите, дружно устаете",
    "Тут весело по сценарию. А вживую как?",
    "Команда есть. Теперь бы план",
    "Энергии много, синхронизации — как получится",
    "Группой вы выглядите смелее, чем по одному",
    "Кто-то на фото думает о еде. И это лучший план",
    "Людей много — объектив страдает",
    "Съёмка корпоративная по духу, даже если это не так",
    "Химия есть. Только не перегрейте",
];

const TEXT: &[&str] = &[
    "Надпись на фото тонко намекает, что пора взять себя в руки",
    "Текст громкий, смысл в отпуске",
    "Надпись уверена, что это важно. Убедила?",
    "Лозунг бодрый. Привычки — нет",
    "Слова прямо в кадре. И все равно мимо сути",
    "Текст старается, читатель — как получится",
    "Подпись серьезная, жизнь — мем",
    "Если следовать написанному, сюрпризов будет меньше",
    "Текст на месте, выводов нет",
    "Надпись кричит, совесть шепчет",
    "Слова не плохие. Выполнение традиционно страдает",
    "Читается легко, выполняется тяжело",
];

const DEFAULT: &[&str] = &[
    "Кадр уверенный, смысла в нем примерно как в твоих оправданиях",
    "Снято небездарно. Дальше будет сложнее",
    "Фото живое. Постарайся не заглушить",
    "Композиция пытается, ты мешаешь чуть меньше обычного",
    "Снимок норм. С характером поработаем позже",
    "В этом кадре есть настроение. Тебе бы такое",
    "Получилось на удивление сносно",
    "Неплохо. Неожиданно честно",
    "Слегка драматично. Как твоя самооценка по утрам",
    "Смотришь — и вроде хочется верить, что ты стараешься",
    "Дерзко сфоткал. Осталось жить в том же стиле",
    "Картинка дышит. Ты — попробуй тоже",
];

const TEXT_TAILS: &[&str] = &[
    "надпись уверенно делает вид, что так и задумано",
    "текст обещает больше, чем реальность",
    "подпись старается звучать умно — пусть так и будет",
    "слова в кадре громкие, выводы — тише",
];

/// Заезженные фразы, которые не должны попадать в чат.
const BANNED: &[&str] = &[
    "О, еще одно селфи",
    "Красиво, но не так красиво, как мой код",
    "Фильтры работают, а вот твоя логика - нет",
    "Текст есть, а смысла нет",
    "Текст на фото умнее тебя",
    "Групповое фото - это когда все притворяются, что им весело",
];

impl PhotoType {
    pub fn detect(analysis: &ImageAnalysis) -> Self {
        match analysis.faces.len() {
            0 => {}
            1 => return PhotoType::Selfie,
            _ => return PhotoType::Group,
        }
        let labels = analysis
            .labels
            .iter()
            .map(|l| l.description.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let has = |keywords: &[&str]| keywords.iter().any(|k| labels.contains(k));
        if has(FOOD_KEYWORDS) {
            PhotoType::Food
        } else if has(PET_KEYWORDS) {
            PhotoType::Pet
        } else if has(LANDSCAPE_KEYWORDS) {
            PhotoType::Landscape
        } else if !analysis.text.is_empty() {
            PhotoType::Text
        } else {
            PhotoType::Default
        }
    }

    fn phrases(self) -> &'static [&'static str] {
        match self {
            PhotoType::Selfie => SELFIE,
            PhotoType::Group => GROUP,
            PhotoType::Food => FOOD,
            PhotoType::Pet => PET,
            PhotoType::Landscape => LANDSCAPE,
            PhotoType::Text => TEXT,
            PhotoType::Default => DEFAULT,
        }
    }
}

/// Первые 12 hex-цифр SHA-256 от `labels[..5] | objects[..5] | text[0][..32]`.
pub fn content_seed(analysis: &ImageAnalysis) -> u64 {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(analysis.labels.iter().take(5).map(|l| l.description.clone()));
    parts.extend(analysis.objects.iter().take(5).map(|o| o.description.clone()));
    if let Some(text) = analysis.text.first() {
        parts.push(text.chars().take(32).collect());
    }
    let raw = if parts.is_empty() {
        "fallback".to_string()
    } else {
        parts.join("|")
    };
    let digest = Sha256::digest(raw.as_bytes());
    // 12 hex digits == 6 bytes
    digest[..6].iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn seeded(seed: u64, salt: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(salt))
}

fn pick(options: &'static [&'static str], seed: u64, salt: u64) -> &'static str {
    options
        .choose(&mut seeded(seed, salt))
        .copied()
        .unwrap_or_default()
}

fn tail(analysis: &ImageAnalysis, seed: u64) -> String {
    let mut phrases: Vec<&str> = Vec::new();
    match analysis.faces.len() {
        0 => {}
        1 => phrases.push("на фото один герой, и ему бы отдохнуть"),
        2 | 3 => phrases.push("компания дружная, но нервы у камеры на пределе"),
        _ => phrases.push("людей много — внимания мало"),
    }
    if !analysis.text.is_empty() {
        phrases.push(pick(TEXT_TAILS, seed, TEXT_SALT));
    }
    match (!analysis.objects.is_empty(), !analysis.labels.is_empty()) {
        (true, true) => phrases.push("в кадре деталей достаточно, осталось навести на смысл"),
        (true, false) => phrases.push("предметов хватает — а вот идеи бы добавить"),
        (false, true) => phrases.push("настроение считывается, даже если ты его не планировал"),
        (false, false) => {}
    }
    phrases.shuffle(&mut seeded(seed, SHUFFLE_SALT));
    phrases.truncate(2);
    phrases.join(" ")
}

/// Одна реплика без технических подробностей.
pub fn comment(analysis: Option<&ImageAnalysis>) -> String {
    let Some(analysis) = analysis else {
        return NO_ANALYSIS.to_string();
    };
    let seed = content_seed(analysis);
    let base = pick(PhotoType::detect(analysis).phrases(), seed, BASE_SALT);
    let tail = tail(analysis, seed);
    let result = if tail.is_empty() {
        base.to_string()
    } else {
        format!("{base}; {tail}")
    };

    let lower = result.to_lowercase();
    if BANNED.iter().any(|b| lower.contains(&b.to_lowercase())) {
        return pick(DEFAULT, seed, BANNED_SALT).to_string();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{Face, Scored};

    fn scored(name: &str) -> Scored {
        Scored {
            description: name.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn detects_photo_type() {
        let mut a = ImageAnalysis::default();
        assert_eq!(PhotoType::detect(&a), PhotoType::Default);
        a.text.push("SALE".into());
        assert_eq!(PhotoType::detect(&a), PhotoType::Text);
        a.labels.push(scored("Mountain"));
        assert_eq!(PhotoType::detect(&a), PhotoType::Landscape);
        a.labels.push(scored("Pizza"));
        assert_eq!(PhotoType::detect(&a), PhotoType::Food);
        a.faces.push(Face::default());
        assert_eq!(PhotoType::detect(&a), PhotoType::Selfie);
        a.faces.push(Face::default());
        assert_eq!(PhotoType::detect(&a), PhotoType::Group);
    }

    #[test]
    fn seed_depends_on_content() {
        let empty = ImageAnalysis::default();
        let mut cat = ImageAnalysis::default();
        cat.labels.push(scored("Cat"));
        assert_eq!(content_seed(&empty), content_seed(&ImageAnalysis::default()));
        assert_ne!(content_seed(&empty), content_seed(&cat));
        assert!(content_seed(&cat) < 1 << 48);
    }

    #[test]
    fn comment_is_stable_and_uses_type_table() {
        let mut dog = ImageAnalysis::default();
        dog.labels.push(scored("Dog"));
        dog.objects.push(scored("Leash"));
        let first = comment(Some(&dog));
        assert_eq!(first, comment(Some(&dog)));

        let (base, tail) = first.split_once("; ").unwrap();
        assert!(PET.contains(&base));
        assert_eq!(tail, "в кадре деталей достаточно, осталось навести на смысл");
    }

    #[test]
    fn tail_keeps_at_most_two_phrases() {
        let mut busy = ImageAnalysis::default();
        busy.faces = vec![Face::default(); 5];
        busy.text.push("LOUD".into());
        busy.labels.push(scored("Crowd"));
        let text = comment(Some(&busy));
        let (base, _) = text.split_once("; ").unwrap();
        assert!(GROUP.contains(&base));
        let known = [
            "людей много — внимания мало",
            "в кадре деталей достаточно, осталось навести на смысл",
            "настроение считывается, даже если ты его не планировал",
        ];
        let hits = known
            .iter()
            .chain(TEXT_TAILS.iter())
            .filter(|p| text.contains(*p))
            .count();
        assert_eq!(hits, 2);
    }

    #[test]
    fn missing_analysis_has_fixed_reply() {
        assert_eq!(comment(None), NO_ANALYSIS);
    }
}
