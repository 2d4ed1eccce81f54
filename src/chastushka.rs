//! Саркастические частушки по шаблонам.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Theme {
    Life,
    Work,
    Love,
    Money,
    Health,
    Tech,
}

const THEMES: &[Theme] = &[Theme::Life, Theme::Work, Theme::Love, Theme::Money, Theme::Health, Theme::Tech];

const TARGETS: &[&str] = &["ты", "он", "она", "мы", "вы", "они", "все", "никто", "каждый", "любой"];
const COMPARISONS: &[&str] = &[
    "как старая батарейка", "как сломанный будильник", "как пустой кошелек",
    "как дырявый зонт", "как сгоревшая лампочка", "как ржавый гвоздь",
    "как прокисшее молоко", "как увядший цветок", "как сдувшийся шарик",
];
const WORK_SITUATIONS: &[&str] = &[
    "как на каторге", "как в тюрьме", "как в аду", "как в кошмаре",
    "как в ловушке", "как в клетке", "как в болоте", "как в тупике",
];
const WORK_ACTIONS: &[&str] = &[
    "трудишься как пчелка", "пашешь как лошадь", "вкалываешь как раб",
    "работаешь как вол", "трудишься как муравей", "пашешь как трактор",
];
const LOVE_COMPARISONS: &[&str] = &[
    "роза с шипами", "мед с ядом", "солнце с тучами",
    "радуга с дождем", "огонь с водой", "лед с пламенем",
];
const LOVE_ACTIONS: &[&str] = &[
    "влюбляешься как дурак", "страдаешь как романтик", "мечтаешь как поэт",
    "страдаешь как герой", "влюбляешься как подросток", "мечтаешь как идеалист",
];
const MONEY_SITUATIONS: &[&str] = &[
    "как вода в песок", "как дым в небо", "как снег на солнце",
    "как песок сквозь пальцы", "как ветер в поле", "как дождь в море",
];
const MONEY_ACTIONS: &[&str] = &[
    "тратишь как миллионер", "считаешь как бухгалтер", "экономишь как скряга",
    "тратишь как транжира", "считаешь как банкир", "экономишь как мышь",
];
const HEALTH_SITUATIONS: &[&str] = &[
    "как хрупкий фарфор", "как тонкая нить", "как стеклянный шар",
    "как бумажный кораблик", "как мыльный пузырь", "как песочный замок",
];
const HEALTH_ACTIONS: &[&str] = &[
    "заботишься как врач", "лечишься как пациент", "бережешь как сокровище",
    "заботишься как мать", "лечишься как больной", "бережешь как реликвию",
];
const TECH_SITUATIONS: &[&str] = &[
    "как вирус в системе", "как баг в программе", "как глюк в игре",
    "как ошибка в коде", "как сбой в сети", "как зависание компьютера",
];
const TECH_ACTIONS: &[&str] = &[
    "разбираешься как хакер", "используешь как юзер", "настраиваешь как админ",
    "разбираешься как программист", "используешь как новичок", "настраиваешь как мастер",
];
const ACTIONS: &[&str] = &[
    "жить", "работать", "любить", "мечтать", "страдать", "радоваться",
    "грустить", "смеяться", "плакать", "думать", "говорить", "молчать",
];
const RESULTS: &[&str] = &[
    "получилось", "не получилось", "вышло", "не вышло", "сработало", "не сработало",
    "удалось", "не удалось", "повезло", "не повезло",
];
const PHILOSOPHIES: &[&str] = &[
    "главное — не сдаваться", "все будет хорошо", "время лечит", "жизнь продолжается",
    "все проходит", "надежда умирает последней", "терпение и труд все перетрут",
    "что не убивает — делает сильнее", "все к лучшему", "все имеет свой смысл",
];

const TOXIC_MEDIUM: &[&str] = &["но ты все равно дурак", "но ты не понимаешь", "но ты не умеешь"];
const TOXIC_SHARP: &[&str] = &["а ты как всегда тупой", "а ты как обычно глупый", "а ты как всегда неудачник"];
const TOXIC_VENOM: &[&str] = &["ты полный идиот", "ты абсолютный дебил", "ты тупой как пробка", "ты глупый как валенок"];

const PROFANITY_WORDS: &[&str] = &["черт", "елки-палки", "японский городовой", "твою мать", "черт возьми"];

/// Тема чата → замена для «в жизни» в первой строке.
const TOPIC_PLACES: &[(&str, &[&str])] = &[
    ("работа", &["на работе", "в офисе", "на службе"]),
    ("деньги", &["с деньгами", "с финансами", "с бюджетом"]),
    ("любовь", &["в любви", "с чувствами", "в отношениях"]),
    ("здоровье", &["со здоровьем", "с самочувствием", "с организмом"]),
    ("технологии", &["с техникой", "с гаджетами", "с интернетом"]),
    ("погода", &["с погодой", "с климатом", "с природой"]),
    ("политика", &["с политикой", "с властью", "с государством"]),
    ("спорт", &["со спортом", "с тренировками", "с фитнесом"]),
];

pub const RANDOM_TOPICS: &[&str] = &["работа", "деньги", "любовь", "здоровье", "технологии", "погода"];

const TOXIC_CHANCE: f64 = 0.3;
const PROFANITY_CHANCE: f64 = 0.2;

fn any<R: Rng + ?Sized>(rng: &mut R, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

impl Theme {
    fn for_topic(topic: &str) -> Option<Self> {
        let topic = topic.to_lowercase();
        [
            ("работ", Theme::Work),
            ("любов", Theme::Love),
            ("деньг", Theme::Money),
            ("здоров", Theme::Health),
            ("технолог", Theme::Tech),
        ]
        .into_iter()
        .find(|(stem, _)| topic.contains(stem))
        .map(|(_, theme)| theme)
    }

    fn render<R: Rng + ?Sized>(self, rng: &mut R) -> String {
        let target = any(rng, TARGETS);
        let result = any(rng, RESULTS);
        let philosophy = any(rng, PHILOSOPHIES);
        match self {
            Theme::Life => format!(
                "Всё в жизни как зебра — полосато,\n{target} {},\n{} — дело святое,\n{result} — вот это да!",
                any(rng, COMPARISONS),
                any(rng, ACTIONS),
            ),
            Theme::Work => format!(
                "На работе {},\n{target} {},\n{result} — не беда,\n{philosophy}, блин, — всегда!",
                any(rng, WORK_SITUATIONS),
                any(rng, WORK_ACTIONS),
            ),
            Theme::Love => format!(
                "Любовь как {},\n{target} {},\n{result} — не проблема,\n{philosophy} — тема!",
                any(rng, LOVE_COMPARISONS),
                any(rng, LOVE_ACTIONS),
            ),
            Theme::Money => format!(
                "Деньги {},\n{target} {},\n{result}, блин, — не вопрос,\n{philosophy} — вопрос!",
                any(rng, MONEY_SITUATIONS),
                any(rng, MONEY_ACTIONS),
            ),
            Theme::Health => format!(
                "Здоровье {},\n{target} {},\n{result} — не беда,\n{philosophy}, блин, — всегда!",
                any(rng, HEALTH_SITUATIONS),
                any(rng, HEALTH_ACTIONS),
            ),
            Theme::Tech => format!(
                "Технологии {},\n{target} {},\n{result} — не проблема,\n{philosophy} — тема!",
                any(rng, TECH_SITUATIONS),
                any(rng, TECH_ACTIONS),
            ),
        }
    }
}

fn toxic_lines(toxicity: u8) -> &'static [&'static str] {
    match toxicity {
        0 => &[],
        1 => TOXIC_MEDIUM,
        2 => TOXIC_SHARP,
        _ => TOXIC_VENOM,
    }
}

fn incorporate_topic<R: Rng + ?Sized>(text: String, topic: &str, rng: &mut R) -> String {
    let topic = topic.to_lowercase();
    match TOPIC_PLACES.iter().find(|(key, _)| topic.contains(key)) {
        Some((_, places)) => text.replacen("в жизни", any(rng, places), 1),
        None => text,
    }
}

/// Частушка на тему. `toxicity` 0..=3, больше трёх считается как три.
pub fn generate<R: Rng + ?Sized>(topic: &str, toxicity: u8, use_profanity: bool, rng: &mut R) -> String {
    let theme = match Theme::for_topic(topic) {
        Some(theme) => theme,
        None => THEMES.choose(rng).copied().unwrap_or(Theme::Life),
    };
    let mut text = theme.render(rng);
    if !topic.trim().is_empty() {
        text = incorporate_topic(text, topic, rng);
    }
    if use_profanity && rng.gen_bool(PROFANITY_CHANCE) {
        text = text.replace("блин", any(rng, PROFANITY_WORDS));
    }
    let toxic = toxic_lines(toxicity.min(3));
    if !toxic.is_empty() && rng.gen_bool(TOXIC_CHANCE) {
        text.push('\n');
        text.push_str(any(rng, toxic));
    }
    text
}

/// Случайная тема, токсичность 0..=2, без мата.
pub fn random<R: Rng + ?Sized>(rng: &mut R) -> String {
    let topic = any(rng, RANDOM_TOPICS);
    let toxicity = rng.gen_range(0..=2);
    generate(topic, toxicity, false, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn topic_picks_matching_template() {
        let mut rng = StdRng::seed_from_u64(7);
        let text = generate("про работу", 0, false, &mut rng);
        assert!(text.starts_with("На работе "));
        assert_eq!(text.lines().count(), 4);

        let text = generate("Деньги", 0, false, &mut rng);
        assert!(text.starts_with("Деньги как "));
    }

    #[test]
    fn known_topic_replaces_life_place() {
        let mut rng = StepRng::new(0, 0);
        let text = incorporate_topic(Theme::Life.render(&mut rng), "погода", &mut rng);
        assert!(text.starts_with("Всё с погодой как зебра"));
        let untouched = incorporate_topic("Всё в жизни".to_string(), "котики", &mut rng);
        assert_eq!(untouched, "Всё в жизни");
    }

    #[test]
    fn zero_toxicity_never_adds_a_line() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = generate("работа", 0, false, &mut rng);
            assert_eq!(text.lines().count(), 4);
        }
    }

    #[test]
    fn toxic_line_shows_up_sometimes() {
        let toxic = (0..200)
            .filter(|seed| {
                let mut rng = StdRng::seed_from_u64(*seed);
                generate("здоровье", 3, false, &mut rng).lines().count() == 5
            })
            .count();
        assert!(toxic > 20 && toxic < 120, "toxic lines: {toxic}");
    }

    #[test]
    fn profanity_swaps_blin() {
        let swapped = (0..200).any(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            !generate("работа", 0, true, &mut rng).contains("блин")
        });
        assert!(swapped);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generate("работа", 0, false, &mut rng).contains("блин"));
    }

    #[test]
    fn random_chastushka_is_clean() {
        let mut rng = StdRng::seed_from_u64(42);
        let text = random(&mut rng);
        assert!(text.lines().count() >= 4);
        assert!(!text.contains("твою мать"));
    }
}
