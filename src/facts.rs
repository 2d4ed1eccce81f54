use anyhow::Result;
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tracing::info;

use crate::clock::Clock;
use crate::db::{Db, FactRecord, FactSeed, FactStats};

/// (подкатегория, [(факт, подкол, категория)])
const LIBRARY: &[(&str, &[(&str, &str, &str)])] = &[
    (
        "animals",
        &[
            ("Осьминоги имеют три сердца и голубую кровь", "А у тебя одно сердце и красная кровь, но ты всё равно не умеешь любить", "biology"),
            ("Коалы спят 18-22 часа в сутки", "Ты тоже много спишь, но хотя бы коалы милые", "biology"),
            ("Пингвины могут прыгать на высоту до 2 метров", "А ты не можешь даже прыгнуть выше своих амбиций", "biology"),
            ("Слоны помнят всё на протяжении 60 лет", "А ты забываешь, где оставил ключи от квартиры", "biology"),
            ("Дельфины дают друг другу имена", "А тебя зовут просто 'тот парень с плохими шутками'", "biology"),
            ("Бегемоты бегают быстрее человека", "Даже бегемот быстрее тебя, а ты думаешь, что в хорошей форме", "biology"),
            ("Крокодилы не могут высовывать язык", "А ты не можешь держать язык за зубами", "biology"),
            ("Улитки могут спать до 3 лет", "Ты тоже много спишь, но улитки хотя бы полезны", "biology"),
        ],
    ),
    (
        "science",
        &[
            ("Солнце весит в 333,000 раз больше Земли", "А твой мозг весит в 333,000 раз меньше, чем у нормального человека", "physics"),
            ("Человеческий мозг на 75% состоит из воды", "У тебя, видимо, остальные 25% - это пустота", "biology"),
            ("Бананы радиоактивны из-за калия-40", "А ты токсичен из-за своей личности", "chemistry"),
            ("В космосе нет звука", "А в твоей голове тоже тишина", "physics"),
            ("Свет от Солнца до Земли идёт 8 минут", "А твоя мысль до мозга идёт 8 часов", "physics"),
            ("Вода кипит при 100°C", "А ты закипаешь от любой критики", "chemistry"),
            ("Золото не ржавеет", "А твоя репутация ржавеет каждый день", "chemistry"),
            ("Чёрные дыры поглощают всё, включая свет", "А ты поглощаешь всё, включая чужую еду", "physics"),
        ],
    ),
    (
        "history",
        &[
            ("Наполеон был ростом 168 см", "Он завоевал пол-Европы, а ты не можешь даже завоевать сердце соседки", "historical"),
            ("Пирамиды строили 20 лет", "А ты 20 лет строишь из себя умного", "historical"),
            ("Римская империя просуществовала 1000 лет", "А твоя мотивация длится 5 минут", "historical"),
            ("Колумб думал, что открыл Индию", "А ты думаешь, что открыл Америку, сидя на диване", "historical"),
            ("Викинги были отличными мореплавателями", "А ты не можешь даже переплыть бассейн", "historical"),
            ("Древние египтяне изобрели папирус", "А ты изобрёл способ тратить время впустую", "historical"),
            ("Великая Китайская стена видна из космоса", "А твои достижения не видны даже в микроскоп", "historical"),
            ("Стоунхендж построили 5000 лет назад", "А ты до сих пор не можешь собрать мебель из ИКЕА", "historical"),
        ],
    ),
    (
        "technology",
        &[
            ("Первый компьютер весил 27 тонн", "А твой мозг весит как перышко", "tech"),
            ("Интернет изобрели в 1969 году", "А ты до сих пор не умеешь им пользоваться", "tech"),
            ("Первый iPhone появился в 2007 году", "А ты до сих пор пользуешься кнопочным телефоном", "tech"),
            ("Google обрабатывает 8.5 миллиардов запросов в день", "А ты обрабатываешь 8.5 глупых мыслей в минуту", "tech"),
            ("Wi-Fi изобрели в 1991 году", "А ты до сих пор не можешь подключиться к жизни", "tech"),
            ("Первый сайт создали в 1991 году", "А ты до сих пор не можешь создать профиль в соцсетях", "tech"),
        ],
    ),
    (
        "food",
        &[
            ("Мёд никогда не портится", "А твои шутки портятся с каждой секундой", "food"),
            ("Шоколад был валютой у ацтеков", "А ты используешь валюту, чтобы купить шоколад", "food"),
            ("Морковь изначально была фиолетовой", "А ты изначально был нормальным", "food"),
            ("Пиццу изобрели в Италии", "А ты изобрёл способ заказывать её каждый день", "food"),
            ("Кофе - второй по популярности напиток в мире", "А ты - первый по непопулярности в своём районе", "food"),
            ("Бананы - это ягоды", "А ты - это разочарование", "food"),
        ],
    ),
];

const SUBCATEGORY_ALIASES: &[(&str, &str)] = &[
    ("животные", "animals"),
    ("наука", "science"),
    ("история", "history"),
    ("технологии", "technology"),
    ("техника", "technology"),
    ("еда", "food"),
];

/// Встроенная библиотека с идентификаторами `fact_1`, `fact_2`, ... в порядке объявления.
pub fn builtin_library() -> Vec<FactSeed> {
    LIBRARY
        .iter()
        .flat_map(|(sub, facts)| facts.iter().map(move |f| (*sub, f)))
        .enumerate()
        .map(|(i, (sub, (fact, roast, category)))| FactSeed {
            id: format!("fact_{}", i + 1),
            fact_text: fact.to_string(),
            roast_text: roast.to_string(),
            category: category.to_string(),
            subcategory: sub.to_string(),
        })
        .collect()
}

pub fn subcategories() -> impl Iterator<Item = &'static str> {
    LIBRARY.iter().map(|(sub, _)| *sub)
}

/// `животные` → `animals`; неизвестные значения — `None`.
pub fn resolve_subcategory(raw: &str) -> Option<&'static str> {
    let raw = raw.trim().to_lowercase();
    subcategories()
        .find(|s| *s == raw)
        .or_else(|| SUBCATEGORY_ALIASES.iter().find(|(alias, _)| *alias == raw).map(|(_, s)| *s))
}

fn day_key(now: OffsetDateTime) -> String {
    now.date().to_string()
}

fn time_key(now: OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
}

pub fn format_fact(fact: &FactRecord) -> String {
    format!("🧠 Факт дня: {}\n\n😏 {}", fact.fact_text, fact.roast_text)
}

pub fn format_stats(stats: &FactStats) -> String {
    format!(
        "📊 Твоя статистика фактов:\n📚 Всего прочитано: {}\n📅 Сегодня: {}\n❤️ Любимая категория: {}",
        stats.total_read,
        stats.today_read,
        stats.favorite_category.as_deref().unwrap_or("Нет данных"),
    )
}

#[derive(Clone)]
pub struct Facts {
    db: Db,
    clock: Clock,
}

impl Facts {
    pub fn new(db: Db, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Заполняет библиотеку при первом запуске.
    pub async fn seed(&self) -> Result<usize> {
        let inserted = self.db.seed_facts(builtin_library()).await?;
        if inserted > 0 {
            info!(inserted, "Facts library seeded");
        }
        Ok(inserted)
    }

    /// Случайный факт, который пользователь сегодня ещё не видел, и отметка об отправке.
    /// Когда непрочитанное кончилось, дневной журнал сбрасывается.
    pub async fn next_for(&self, user_id: i64, subcategory: Option<&str>) -> Result<Option<FactRecord>> {
        self.next_for_at(user_id, subcategory, self.clock.now()).await
    }

    async fn next_for_at(
        &self,
        user_id: i64,
        subcategory: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Option<FactRecord>> {
        let today = day_key(now);
        let sub = subcategory.map(str::to_string);
        let mut pool = self.db.unseen_facts(user_id, sub.clone(), today.clone()).await?;
        if pool.is_empty() {
            info!(user_id, "All facts shown today, resetting");
            self.db.clear_sent_facts(user_id, today.clone()).await?;
            pool = self.db.unseen_facts(user_id, sub, today.clone()).await?;
        }
        let picked = pool.choose(&mut rand::thread_rng()).cloned();
        if let Some(fact) = &picked {
            self.db.mark_fact_sent(user_id, fact, today, time_key(now)).await?;
            info!(user_id, fact_id = %fact.id, "Fact sent");
        }
        Ok(picked)
    }

    pub async fn stats(&self, user_id: i64) -> Result<FactStats> {
        self.db.fact_stats(user_id, day_key(self.clock.now())).await
    }
}
