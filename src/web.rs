//! Веб-панель: HTML-страницы и JSON API поверх той же базы, открытой на чтение.

use std::fmt::Write as _;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use html_escape::encode_text;
use serde::Serialize;
use tracing::{error, info};

use crate::db::{Db, DashboardStats, UserOverview, VideoRecord};

const RECENT_ON_DASHBOARD: i64 = 10;

#[derive(Clone)]
pub struct WebState {
    pub db: Db,
    pub db_path: String,
    pub port: u16,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub enum ApiError {
    NotFound(&'static str),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
            ApiError::Internal(err) => {
                error!(error = %err, "dashboard api error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Ошибка HTML-страницы: 500 с текстом ошибки.
pub struct PageError(anyhow::Error);

impl From<anyhow::Error> for PageError {
    fn from(err: anyhow::Error) -> Self {
        PageError(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "dashboard page error");
        let body = layout("Ошибка", &format!("<p class=\"error\">{}</p>", encode_text(&self.0.to_string())));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/videos", get(videos_page))
        .route("/users", get(users_page))
        .route("/settings", get(settings_page))
        .route("/api/stats", get(api_stats))
        .route("/api/videos", get(api_videos))
        .route("/api/users", get(api_users))
        .route("/api/video/{id}", get(api_video))
        .with_state(state)
}

pub async fn serve(state: WebState, host: &str) -> anyhow::Result<()> {
    let addr = format!("{host}:{}", state.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Dashboard listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"ru\"><head><meta charset=\"utf-8\">\
         <title>Гриша · {title}</title></head><body>\
         <nav><a href=\"/\">Главная</a> | <a href=\"/videos\">Видео</a> | \
         <a href=\"/users\">Пользователи</a> | <a href=\"/settings\">Настройки</a></nav>\
         <h1>{title}</h1>{body}</body></html>",
        title = encode_text(title),
    ))
}

fn opt(v: &Option<String>) -> String {
    encode_text(v.as_deref().unwrap_or("—")).into_owned()
}

fn stats_block(stats: &DashboardStats) -> String {
    format!(
        "<ul class=\"stats\">\
         <li>Всего видео: {}</li><li>Пользователей: {}</li><li>Чатов: {}</li>\
         <li>Сегодня: {}</li><li>За неделю: {}</li><li>За месяц: {}</li></ul>",
        stats.total_videos,
        stats.total_users,
        stats.total_chats,
        stats.videos_today,
        stats.videos_this_week,
        stats.videos_this_month,
    )
}

fn videos_table(videos: &[VideoRecord]) -> String {
    if videos.is_empty() {
        return "<p>Видео пока нет.</p>".to_string();
    }
    let mut html = String::from(
        "<table><tr><th>#</th><th>Тип</th><th>Автор</th><th>Чат</th><th>Подпись</th><th>Добавлено</th></tr>",
    );
    for v in videos {
        let _ = write!(
            html,
            "<tr><td><a href=\"/api/video/{id}\">{id}</a></td><td>{kind}</td><td>{author}</td>\
             <td>{chat}</td><td>{caption}</td><td>{date}</td></tr>",
            id = v.id,
            kind = v.kind.as_str(),
            author = opt(&v.username),
            chat = v.chat_id,
            caption = opt(&v.caption),
            date = encode_text(&v.date_added),
        );
    }
    html.push_str("</table>");
    html
}

fn users_table(users: &[UserOverview]) -> String {
    if users.is_empty() {
        return "<p>Пользователей пока нет.</p>".to_string();
    }
    let mut html = String::from(
        "<table><tr><th>ID</th><th>Username</th><th>Имя</th><th>Прозвище</th><th>Видео</th><th>Последнее</th></tr>",
    );
    for u in users {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            u.user_id,
            opt(&u.username),
            opt(&u.first_name),
            opt(&u.nickname),
            u.video_count,
            opt(&u.last_video_date),
        );
    }
    html.push_str("</table>");
    html
}

async fn dashboard(State(state): State<WebState>) -> Result<Html<String>, PageError> {
    let stats = state.db.dashboard_stats().await?;
    let recent = state.db.recent_videos(Some(RECENT_ON_DASHBOARD)).await?;
    let users = state.db.users_overview().await?;
    let body = format!(
        "{}<h2>Последние видео</h2>{}<h2>Пользователи</h2>{}",
        stats_block(&stats),
        videos_table(&recent),
        users_table(&users)
    );
    Ok(layout("Панель", &body))
}

async fn videos_page(State(state): State<WebState>) -> Result<Html<String>, PageError> {
    let videos = state.db.recent_videos(None).await?;
    Ok(layout("Видео", &videos_table(&videos)))
}

async fn users_page(State(state): State<WebState>) -> Result<Html<String>, PageError> {
    let users = state.db.users_overview().await?;
    Ok(layout("Пользователи", &users_table(&users)))
}

async fn settings_page(State(state): State<WebState>) -> Result<Html<String>, PageError> {
    let target = state.db.get_target_chat().await?;
    let events = state.db.active_yearly_events().await?.len();
    let body = format!(
        "<ul><li>Бот: Гриша</li><li>Версия: {}</li><li>База: {}</li><li>Порт панели: {}</li>\
         <li>Целевой чат: {}</li><li>Активных событий: {}</li></ul>",
        env!("CARGO_PKG_VERSION"),
        encode_text(&state.db_path),
        state.port,
        target.map_or_else(|| "не задан".to_string(), |id| id.to_string()),
        events,
    );
    Ok(layout("Настройки", &body))
}

async fn api_stats(State(state): State<WebState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.db.dashboard_stats().await?))
}

async fn api_videos(State(state): State<WebState>) -> Result<Json<Vec<VideoRecord>>, ApiError> {
    Ok(Json(state.db.recent_videos(None).await?))
}

async fn api_users(State(state): State<WebState>) -> Result<Json<Vec<UserOverview>>, ApiError> {
    Ok(Json(state.db.users_overview().await?))
}

async fn api_video(State(state): State<WebState>, Path(id): Path<i64>) -> Result<Json<VideoRecord>, ApiError> {
    state
        .db
        .video_by_id(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Video not found"))
}
