use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, ProfanityLevel};
use crate::error::{ensure_success, VendorError};
use crate::logging::compact;

const SERVICE: &str = "yandexgpt";
const DEFAULT_ENDPOINT: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

const PERSONA: &str = "Ты - четвертый участник дружеской группы из трех человек. Тебя зовут Гриша. \
Ты не бот, а просто друг, который иногда пишет в чат.

Твой стиль:
- Грубоватый, но дружелюбный (как настоящий друг)
- Иногда саркастичный и с подколами
- Шутишь про друзей и их видео
- Можешь быть немного токсичным, но в шутку
- Не говоришь \"чем могу помочь\" - ты не помощник
- Отвечаешь как обычный человек, а не как AI
- Можешь подкалывать за плохие шутки

Примеры ответов:
- \"Ну и что?\" вместо \"Чем могу помочь?\"
- \"Сам расскажи анекдот\" вместо \"Вот анекдот...\"
- \"Опять скучно?\" вместо \"Давайте развлечемся\"
- \"Твои шутки хуже моих\" вместо \"Хорошая шутка\"";

#[derive(Debug, Clone, Serialize)]
struct CompletionOptions {
    stream: bool,
    temperature: f64,
    #[serde(rename = "maxTokens")]
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(rename = "modelUri")]
    model_uri: String,
    #[serde(rename = "completionOptions")]
    completion_options: CompletionOptions,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    text: String,
}

/// Всё, что нужно для одного ответа Гриши в чате.
#[derive(Debug, Clone, Default)]
pub struct ReplyRequest<'a> {
    pub message: &'a str,
    pub context: &'a str,
    pub username: Option<&'a str>,
    /// Заметки о собеседнике из профиля (ник, черты, над чем шутить).
    pub profile: Option<String>,
    pub flavor: Option<&'a str>,
    pub allow_profanity: bool,
}

#[derive(Clone)]
pub struct YandexGpt {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    folder_id: Option<String>,
    profanity_level: ProfanityLevel,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl YandexGpt {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: cfg.yandex_api_key.clone(),
            folder_id: cfg.yandex_folder_id.clone(),
            profanity_level: cfg.profanity_level,
            temperature: 0.7,
            max_tokens: 150,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.folder_id.is_some()
    }

    /// Один запрос completion: возвращает текст первой альтернативы.
    pub async fn complete(&self, messages: &[Message]) -> Result<String, VendorError> {
        let (Some(api_key), Some(folder_id)) = (&self.api_key, &self.folder_id) else {
            return Err(VendorError::MissingKey { service: SERVICE });
        };
        let body = CompletionRequest {
            model_uri: format!("gpt://{folder_id}/yandexgpt"),
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            messages,
        };
        debug!(endpoint = %self.endpoint, messages = messages.len(), "YandexGPT request");

        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Api-Key {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: CompletionResponse = resp.json().await.map_err(VendorError::http(SERVICE))?;
        let text = parsed
            .result
            .alternatives
            .into_iter()
            .next()
            .map(|a| a.message.text)
            .ok_or_else(|| VendorError::malformed(SERVICE, "пустой список alternatives"))?;
        debug!(reply = %compact(&text, 80), "YandexGPT reply");
        Ok(text)
    }

    /// Реплика Гриши в групповом чате.
    pub async fn reply(&self, req: &ReplyRequest<'_>) -> Result<String, VendorError> {
        let messages = [
            Message {
                role: "system",
                text: self.system_prompt(req.allow_profanity, req.flavor),
            },
            Message {
                role: "user",
                text: user_prompt(req),
            },
        ];
        self.complete(&messages).await.map_err(|err| {
            warn!(error = %err, "YandexGPT reply failed");
            err
        })
    }

    pub fn system_prompt(&self, allow_profanity: bool, flavor: Option<&str>) -> String {
        let profanity_clause = match (allow_profanity, self.profanity_level) {
            (false, _) => "Без мата.",
            (true, ProfanityLevel::Soft) => {
                "Умеренная крепкая лексика допустима, без оскорблений по признакам, угроз и явного NSFW."
            }
            (true, ProfanityLevel::Hard) => {
                "Допускается крепкая лексика, но без хейта/дискриминации/угроз/NSFW."
            }
        };
        let mut prompt = format!("{PERSONA}\n- {profanity_clause}");
        if let Some(flavor) = flavor {
            prompt.push_str("\n\nСейчас: ");
            prompt.push_str(flavor);
        }
        prompt.push_str(
            "\n\nБудь как настоящий друг - иногда токсичный, иногда поддерживающий, но всегда в своем стиле.",
        );
        prompt
    }
}

fn user_prompt(req: &ReplyRequest<'_>) -> String {
    let mut prompt = format!(
        "Контекст последних сообщений:\n{}\n\nТекущее сообщение: {}",
        req.context, req.message
    );
    if let Some(username) = req.username {
        prompt.push_str(&format!("\nОт пользователя: {username}"));
    }
    if let Some(profile) = req.profile.as_deref().filter(|p| !p.is_empty()) {
        prompt.push_str(&format!("\nЧто ты о нём знаешь: {profile}"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config() -> Config {
        Config::from_json_str(
            r#"{"teloxide_token":"t","yandex_api_key":"key","yandex_folder_id":"folder"}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn reply_posts_model_uri_and_reads_first_alternative() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/completion")
                    .header("authorization", "Api-Key key")
                    .body_includes("gpt://folder/yandexgpt")
                    .body_includes("Текущее сообщение: привет");
                then.status(200).json_body(json!({
                    "result": {"alternatives": [{"message": {"role": "assistant", "text": "Ну и что?"}}]}
                }));
            })
            .await;

        let gpt = YandexGpt::new(&config()).with_endpoint(server.url("/completion"));
        let req = ReplyRequest {
            message: "привет",
            context: "Пользователь: привет",
            username: Some("leha"),
            ..Default::default()
        };
        let text = gpt.reply(&req).await.unwrap();
        assert_eq!(text, "Ну и что?");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/completion");
                then.status(401).body("unauthorized");
            })
            .await;
        let gpt = YandexGpt::new(&config()).with_endpoint(server.url("/completion"));
        let err = gpt.complete(&[]).await.unwrap_err();
        assert!(matches!(err, VendorError::Status { .. }));
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let cfg = Config::from_json_str(r#"{"teloxide_token":"t"}"#).unwrap();
        let gpt = YandexGpt::new(&cfg);
        assert!(!gpt.is_configured());
        assert!(matches!(
            gpt.complete(&[]).await,
            Err(VendorError::MissingKey { .. })
        ));
    }

    #[test]
    fn prompt_reflects_profanity_and_flavor() {
        let gpt = YandexGpt::new(&config());
        let clean = gpt.system_prompt(false, None);
        assert!(clean.contains("Без мата."));
        let spicy = gpt.system_prompt(true, Some("Просто вклинься"));
        assert!(spicy.contains("Умеренная крепкая лексика"));
        assert!(spicy.contains("Сейчас: Просто вклинься"));
    }
}
