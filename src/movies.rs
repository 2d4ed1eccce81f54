use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ensure_success, VendorError};

const SERVICE: &str = "kinopoisk";
const DEFAULT_BASE_URL: &str = "https://api.kinopoisk.dev";
const TIMEOUT: Duration = Duration::from_secs(15);
const GOOD_RATING: f64 = 7.0;
const POPULAR_RATING: f64 = 7.5;
const MIN_GOOD_RESULTS: usize = 3;
const DESCRIPTION_LIMIT: usize = 200;

/// Жанры, которые понимает Кинопоиск (ключ — как пишут в чате).
pub const GENRES: &[&str] = &[
    "комедия", "драма", "триллер", "боевик", "фантастика", "ужасы", "детектив",
    "мелодрама", "приключения", "фэнтези", "криминал", "биография", "мультфильм", "семейный",
];

const MOOD_GENRES: &[(&str, &[&str])] = &[
    ("грустно", &["драма", "мелодрама", "биография"]),
    ("весело", &["комедия", "приключения", "мультфильм"]),
    ("хочется подумать", &["драма", "криминал", "детектив"]),
    ("хочется поспать", &["драма", "мелодрама", "биография"]),
    ("хочется адреналина", &["боевик", "триллер", "ужасы"]),
    ("романтично", &["мелодрама", "комедия", "семейный"]),
    ("с детьми", &["семейный", "мультфильм", "приключения"]),
];
const FALLBACK_MOOD_GENRES: &[&str] = &["драма", "комедия"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rating {
    #[serde(default)]
    pub kp: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Poster {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alternative_name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub poster: Option<Poster>,
}

impl Movie {
    pub fn kp_rating(&self) -> Option<f64> {
        self.rating.as_ref().and_then(|r| r.kp).filter(|r| *r > 0.0)
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    docs: Vec<Movie>,
}

/// Параметры `/v1.4/movie`.
#[derive(Debug, Clone, Default)]
pub struct MovieQuery<'a> {
    pub genre: Option<&'a str>,
    pub year: Option<i32>,
    pub rating_min: Option<f64>,
    pub limit: u32,
}

#[derive(Clone)]
pub struct Kinopoisk {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

/// Жанр для настроения; неизвестное настроение — драма или комедия.
pub fn genre_for_mood<R: Rng + ?Sized>(mood: &str, rng: &mut R) -> &'static str {
    let mood = mood.trim().to_lowercase();
    let options = MOOD_GENRES
        .iter()
        .find(|(m, _)| *m == mood)
        .map(|(_, genres)| *genres)
        .unwrap_or(FALLBACK_MOOD_GENRES);
    options.choose(rng).copied().unwrap_or("драма")
}

pub fn is_mood(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    MOOD_GENRES.iter().any(|(m, _)| *m == text)
}

pub fn mood_names() -> impl Iterator<Item = &'static str> {
    MOOD_GENRES.iter().map(|(m, _)| *m)
}

fn normalize_genre(genre: &str) -> String {
    let lower = genre.trim().to_lowercase();
    GENRES
        .iter()
        .find(|g| **g == lower)
        .map(|g| g.to_string())
        .unwrap_or_else(|| genre.trim().to_string())
}

impl Kinopoisk {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: cfg.kinopoisk_api_token.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<reqwest::Response, VendorError> {
        let token = self
            .api_token
            .as_deref()
            .ok_or(VendorError::MissingKey { service: SERVICE })?;
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?params, "Kinopoisk request");
        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", token)
            .query(params)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        ensure_success(SERVICE, resp).await
    }

    pub async fn search(&self, query: &MovieQuery<'_>) -> Result<Vec<Movie>, VendorError> {
        let mut params = vec![
            ("limit", query.limit.max(1).to_string()),
            ("page", "1".to_string()),
        ];
        if let Some(genre) = query.genre {
            params.push(("genres.name", genre.to_string()));
        }
        if let Some(year) = query.year {
            params.push(("year", year.to_string()));
        }
        if let Some(rating) = query.rating_min {
            params.push(("rating.kp", format!("{rating}-10")));
        }
        let page: Page = self
            .get("/v1.4/movie", &params)
            .await?
            .json()
            .await
            .map_err(VendorError::http(SERVICE))?;
        Ok(page.docs)
    }

    pub async fn random(&self, genre: Option<&str>) -> Result<Movie, VendorError> {
        let params: Vec<(&str, String)> = genre
            .map(|g| vec![("genres.name", normalize_genre(g))])
            .unwrap_or_default();
        self.get("/v1.4/movie/random", &params)
            .await?
            .json()
            .await
            .map_err(VendorError::http(SERVICE))
    }

    pub async fn search_by_name(&self, name: &str) -> Result<Vec<Movie>, VendorError> {
        let params = [
            ("query", name.to_string()),
            ("limit", "5".to_string()),
            ("page", "1".to_string()),
        ];
        let page: Page = self
            .get("/v1.4/movie/search", &params)
            .await?
            .json()
            .await
            .map_err(VendorError::http(SERVICE))?;
        Ok(page.docs)
    }

    /// Сначала хорошие фильмы жанра; если их меньше трёх — без фильтра по рейтингу.
    pub async fn by_genre(&self, genre: &str) -> Result<Vec<Movie>, VendorError> {
        let genre = normalize_genre(genre);
        let good = self
            .search(&MovieQuery {
                genre: Some(&genre),
                rating_min: Some(GOOD_RATING),
                limit: 5,
                ..Default::default()
            })
            .await?;
        if good.len() >= MIN_GOOD_RESULTS {
            return Ok(good);
        }
        info!(%genre, found = good.len(), "Relaxing Kinopoisk rating filter");
        self.search(&MovieQuery {
            genre: Some(&genre),
            limit: 5,
            ..Default::default()
        })
        .await
    }

    pub async fn by_mood(&self, mood: &str) -> Result<Vec<Movie>, VendorError> {
        let genre = genre_for_mood(mood, &mut rand::thread_rng());
        self.by_genre(genre).await
    }

    pub async fn popular(&self, year: Option<i32>) -> Result<Vec<Movie>, VendorError> {
        self.search(&MovieQuery {
            year,
            rating_min: Some(POPULAR_RATING),
            limit: 5,
            ..Default::default()
        })
        .await
    }
}

pub fn format_movie(movie: &Movie) -> String {
    let mut info = format!("🎬 {}", movie.name.as_deref().unwrap_or("Неизвестно"));
    if let Some(alt) = movie.alternative_name.as_deref().filter(|s| !s.is_empty()) {
        info.push_str(&format!(" ({alt})"));
    }
    if let Some(year) = movie.year {
        info.push_str(&format!(" ({year})"));
    }
    if let Some(rating) = movie.kp_rating() {
        info.push_str(&format!(" ⭐ {rating}"));
    }

    let description = movie
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or("Описание отсутствует");
    if description.chars().count() > DESCRIPTION_LIMIT {
        let cut: String = description.chars().take(DESCRIPTION_LIMIT).collect();
        info.push_str(&format!("\n📝 {cut}..."));
    } else {
        info.push_str(&format!("\n📝 {description}"));
    }

    if let Some(url) = movie
        .poster
        .as_ref()
        .and_then(|p| p.url.as_deref())
        .filter(|u| !u.is_empty())
    {
        info.push_str(&format!("\n🖼️ {url}"));
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rand::rngs::mock::StepRng;
    use serde_json::json;

    #[test]
    fn requests_time_out_within_fifteen_seconds() {
        assert!(TIMEOUT <= Duration::from_secs(15));
    }

    fn client(server: &MockServer) -> Kinopoisk {
        let cfg = Config::from_json_str(r#"{"teloxide_token":"t","kinopoisk_api_token":"kp"}"#).unwrap();
        Kinopoisk::new(&cfg).with_base_url(server.base_url())
    }

    fn docs(n: usize) -> serde_json::Value {
        let docs: Vec<_> = (0..n).map(|i| json!({"name": format!("Фильм {i}")})).collect();
        json!({ "docs": docs })
    }

    #[tokio::test]
    async fn search_sends_filters_and_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1.4/movie")
                    .header("X-API-KEY", "kp")
                    .query_param("genres.name", "драма")
                    .query_param("rating.kp", "7.5-10")
                    .query_param("limit", "5");
                then.status(200).json_body(docs(2));
            })
            .await;
        let movies = client(&server)
            .search(&MovieQuery {
                genre: Some("драма"),
                rating_min: Some(7.5),
                limit: 5,
                ..Default::default()
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(movies.len(), 2);
    }

    #[tokio::test]
    async fn genre_relaxes_rating_when_too_few() {
        let server = MockServer::start_async().await;
        let strict = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1.4/movie").query_param_exists("rating.kp");
                then.status(200).json_body(docs(1));
            })
            .await;
        let relaxed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1.4/movie")
                    .query_param("genres.name", "комедия")
                    .query_param_missing("rating.kp");
                then.status(200).json_body(docs(5));
            })
            .await;
        let movies = client(&server).by_genre("Комедия").await.unwrap();
        strict.assert_async().await;
        relaxed.assert_async().await;
        assert_eq!(movies.len(), 5);
    }

    #[tokio::test]
    async fn api_error_is_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1.4/movie/random");
                then.status(403).body("forbidden");
            })
            .await;
        assert!(matches!(
            client(&server).random(None).await,
            Err(VendorError::Status { .. })
        ));
    }

    #[test]
    fn mood_maps_to_genre() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(genre_for_mood("весело", &mut rng), "комедия");
        assert_eq!(genre_for_mood("непонятно", &mut rng), "драма");
        assert!(is_mood("С детьми"));
        assert!(!is_mood("комедия"));
    }

    #[test]
    fn format_cuts_long_description() {
        let movie: Movie = serde_json::from_value(json!({
            "name": "Брат",
            "alternativeName": "Brother",
            "year": 1997,
            "rating": {"kp": 8.3},
            "description": "а".repeat(250),
            "poster": {"url": "https://img/p.jpg"}
        }))
        .unwrap();
        let text = format_movie(&movie);
        assert!(text.starts_with("🎬 Брат (Brother) (1997) ⭐ 8.3\n📝 "));
        assert!(text.contains(&format!("{}...", "а".repeat(200))));
        assert!(text.ends_with("\n🖼️ https://img/p.jpg"));

        let bare = format_movie(&Movie::default());
        assert_eq!(bare, "🎬 Неизвестно\n📝 Описание отсутствует");
    }
}
