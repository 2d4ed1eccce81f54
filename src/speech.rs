use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, VoiceGender};
use crate::error::{ensure_success, VendorError};
use crate::logging::compact;

const SERVICE: &str = "speechkit";
const STT_URL: &str = "https://stt.api.cloud.yandex.net/speech/v1/stt:recognize";
const TTS_URL: &str = "https://tts.api.cloud.yandex.net/speech/v1/tts:synthesize";

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    result: Option<String>,
}

/// Yandex SpeechKit v1: распознавание голосовых и синтез речи.
#[derive(Clone)]
pub struct SpeechKit {
    client: reqwest::Client,
    stt_url: String,
    tts_url: String,
    api_key: Option<String>,
    folder_id: Option<String>,
    enabled: bool,
    language: String,
    gender: VoiceGender,
    speed: f64,
    format: String,
}

impl SpeechKit {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            stt_url: STT_URL.to_string(),
            tts_url: TTS_URL.to_string(),
            api_key: cfg.yandex_api_key.clone(),
            folder_id: cfg.yandex_folder_id.clone(),
            enabled: cfg.voice_enabled,
            language: cfg.voice_language.clone(),
            gender: cfg.voice_gender,
            speed: cfg.voice_speed,
            format: cfg.voice_format.clone(),
        }
    }

    pub fn with_urls(mut self, stt_url: impl Into<String>, tts_url: impl Into<String>) -> Self {
        self.stt_url = stt_url.into();
        self.tts_url = tts_url.into();
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn credentials(&self) -> Result<(&str, &str), VendorError> {
        if !self.enabled {
            return Err(VendorError::Disabled { service: SERVICE });
        }
        match (&self.api_key, &self.folder_id) {
            (Some(key), Some(folder)) => Ok((key, folder)),
            _ => Err(VendorError::MissingKey { service: SERVICE }),
        }
    }

    pub fn voice_name(&self) -> &'static str {
        match self.gender {
            VoiceGender::Male => "filipp",
            VoiceGender::Female => "jane",
        }
    }

    /// Распознаёт OGG/Opus (голосовое Telegram). Пустая строка — речь не распознана.
    pub async fn voice_to_text(&self, audio: Vec<u8>) -> Result<String, VendorError> {
        let (api_key, folder_id) = self.credentials()?;
        debug!(bytes = audio.len(), "STT request");
        let resp = self
            .client
            .post(&self.stt_url)
            .header(reqwest::header::AUTHORIZATION, format!("Api-Key {api_key}"))
            .query(&[
                ("lang", self.language.as_str()),
                ("folderId", folder_id),
                ("format", "oggopus"),
                ("profanityFilter", "false"),
            ])
            .body(audio)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: RecognizeResponse = resp.json().await.map_err(VendorError::http(SERVICE))?;
        let text = parsed.result.unwrap_or_default();
        info!(text = %compact(&text, 50), "STT recognized");
        Ok(text)
    }

    /// Синтезирует речь «злым» голосом. Возвращает сырые байты в `VOICE_FORMAT`.
    pub async fn text_to_voice(&self, text: &str) -> Result<Vec<u8>, VendorError> {
        let (api_key, folder_id) = self.credentials()?;
        let speed = self.speed.to_string();
        let form = [
            ("text", text),
            ("lang", self.language.as_str()),
            ("voice", self.voice_name()),
            ("emotion", "evil"),
            ("speed", speed.as_str()),
            ("format", self.format.as_str()),
            ("folderId", folder_id),
        ];
        let resp = self
            .client
            .post(&self.tts_url)
            .header(reqwest::header::AUTHORIZATION, format!("Api-Key {api_key}"))
            .form(&form)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        let resp = ensure_success(SERVICE, resp).await?;
        let bytes = resp.bytes().await.map_err(VendorError::http(SERVICE))?;
        if bytes.is_empty() {
            return Err(VendorError::malformed(SERVICE, "пустой аудиоответ"));
        }
        info!(bytes = bytes.len(), text = %compact(text, 50), "TTS synthesized");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn kit(server: &MockServer, extra: &str) -> SpeechKit {
        let cfg = Config::from_json_str(&format!(
            r#"{{"teloxide_token":"t","yandex_api_key":"k","yandex_folder_id":"f"{extra}}}"#
        ))
        .unwrap();
        SpeechKit::new(&cfg).with_urls(server.url("/stt"), server.url("/tts"))
    }

    #[tokio::test]
    async fn stt_sends_raw_audio_with_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/stt")
                    .query_param("lang", "ru-RU")
                    .query_param("folderId", "f")
                    .query_param("format", "oggopus")
                    .body("OggS-bytes");
                then.status(200).json_body(json!({"result": "привет гриша"}));
            })
            .await;
        let text = kit(&server, "")
            .voice_to_text(b"OggS-bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "привет гриша");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn tts_posts_form_and_returns_bytes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tts")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body_includes("voice=jane")
                    .body_includes("emotion=evil");
                then.status(200).body(vec![1u8, 2, 3]);
            })
            .await;
        let bytes = kit(&server, r#","voice_gender":"female""#)
            .text_to_voice("ну и что")
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn disabled_voice_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;
        let kit = kit(&server, r#","voice_enabled":false"#);
        assert!(matches!(
            kit.text_to_voice("x").await,
            Err(VendorError::Disabled { .. })
        ));
        assert!(matches!(
            kit.voice_to_text(vec![0]).await,
            Err(VendorError::Disabled { .. })
        ));
        mock.assert_calls_async(0).await;
    }
}
