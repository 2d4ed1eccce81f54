use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ensure_success, VendorError};

const SERVICE: &str = "google-vision";
const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scored {
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Face {
    /// `радость: VERY_LIKELY`, `грусть: UNLIKELY`, ...
    pub emotions: Vec<String>,
    pub confidence: f64,
}

/// Разобранный ответ `images:annotate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageAnalysis {
    pub labels: Vec<Scored>,
    pub faces: Vec<Face>,
    pub text: Vec<String>,
    pub objects: Vec<Scored>,
    pub landmarks: Vec<Scored>,
    pub logos: Vec<Scored>,
}

impl ImageAnalysis {
    /// Короткая сводка для логов: `Вижу: a, b | 2 лиц на фото | ...`.
    pub fn summary(&self) -> String {
        let mut details = Vec::new();
        if !self.labels.is_empty() {
            let top: Vec<&str> = self.labels.iter().take(3).map(|l| l.description.as_str()).collect();
            details.push(format!("Вижу: {}", top.join(", ")));
        }
        match self.faces.len() {
            0 => {}
            1 => details.push("Одно лицо на фото".to_string()),
            n => details.push(format!("{n} лиц на фото")),
        }
        if let Some(first) = self.text.first() {
            let preview: String = first.chars().take(50).collect();
            let ellipsis = if first.chars().count() > 50 { "..." } else { "" };
            details.push(format!("Текст: '{preview}{ellipsis}'"));
        }
        if !self.objects.is_empty() {
            let top: Vec<&str> = self.objects.iter().take(3).map(|o| o.description.as_str()).collect();
            details.push(format!("Объекты: {}", top.join(", ")));
        }
        details.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnnotateResult {
    label_annotations: Vec<RawEntity>,
    face_annotations: Vec<RawFace>,
    text_annotations: Vec<RawEntity>,
    localized_object_annotations: Vec<RawObject>,
    landmark_annotations: Vec<RawEntity>,
    logo_annotations: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawFace {
    joy_likelihood: Option<String>,
    sorrow_likelihood: Option<String>,
    anger_likelihood: Option<String>,
    surprise_likelihood: Option<String>,
    detection_confidence: f64,
}

impl From<RawEntity> for Scored {
    fn from(e: RawEntity) -> Self {
        Scored {
            description: e.description,
            confidence: e.score,
        }
    }
}

impl From<RawFace> for Face {
    fn from(f: RawFace) -> Self {
        let emotions = [
            ("радость", f.joy_likelihood),
            ("грусть", f.sorrow_likelihood),
            ("злость", f.anger_likelihood),
            ("удивление", f.surprise_likelihood),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| format!("{name}: {v}")))
        .collect();
        Face {
            emotions,
            confidence: f.detection_confidence,
        }
    }
}

impl From<AnnotateResult> for ImageAnalysis {
    fn from(r: AnnotateResult) -> Self {
        ImageAnalysis {
            labels: r.label_annotations.into_iter().map(Scored::from).collect(),
            faces: r.face_annotations.into_iter().map(Face::from).collect(),
            text: r.text_annotations.into_iter().map(|t| t.description).collect(),
            objects: r
                .localized_object_annotations
                .into_iter()
                .map(|o| Scored {
                    description: o.name,
                    confidence: o.score,
                })
                .collect(),
            landmarks: r.landmark_annotations.into_iter().map(Scored::from).collect(),
            logos: r.logo_annotations.into_iter().map(Scored::from).collect(),
        }
    }
}

#[derive(Clone)]
pub struct VisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl VisionClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(TIMEOUT)
                .build()
                .unwrap_or_default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: cfg.google_vision_api_key.clone(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn analyze(&self, image: &[u8]) -> Result<ImageAnalysis, VendorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VendorError::MissingKey { service: SERVICE })?;
        let body = json!({
            "requests": [{
                "image": { "content": general_purpose::STANDARD.encode(image) },
                "features": [
                    { "type": "LABEL_DETECTION", "maxResults": 10 },
                    { "type": "FACE_DETECTION", "maxResults": 10 },
                    { "type": "TEXT_DETECTION", "maxResults": 10 },
                    { "type": "OBJECT_LOCALIZATION", "maxResults": 10 },
                    { "type": "LANDMARK_DETECTION", "maxResults": 5 },
                    { "type": "LOGO_DETECTION", "maxResults": 5 }
                ]
            }]
        });
        debug!(bytes = image.len(), "Vision annotate request");

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(VendorError::http(SERVICE))?;
        let resp = ensure_success(SERVICE, resp).await?;
        let parsed: AnnotateResponse = resp.json().await.map_err(VendorError::http(SERVICE))?;
        let first = parsed
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| VendorError::malformed(SERVICE, "пустой список responses"))?;
        let analysis = ImageAnalysis::from(first);
        info!(summary = %analysis.summary(), "Vision analysis");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn requests_time_out_within_fifteen_seconds() {
        assert!(TIMEOUT <= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn analyze_parses_annotations() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/annotate")
                    .query_param("key", "vk")
                    .body_includes("LOGO_DETECTION")
                    .body_includes(general_purpose::STANDARD.encode(b"jpeg"));
                then.status(200).json_body(json!({
                    "responses": [{
                        "labelAnnotations": [{"description": "Pizza", "score": 0.97}],
                        "faceAnnotations": [{"joyLikelihood": "VERY_LIKELY", "detectionConfidence": 0.9}],
                        "textAnnotations": [{"description": "SALE"}],
                        "localizedObjectAnnotations": [{"name": "Plate", "score": 0.8}]
                    }]
                }));
            })
            .await;

        let cfg = Config::from_json_str(r#"{"teloxide_token":"t","google_vision_api_key":"vk"}"#).unwrap();
        let vision = VisionClient::new(&cfg).with_endpoint(server.url("/annotate"));
        let analysis = vision.analyze(b"jpeg").await.unwrap();
        mock.assert_async().await;

        assert_eq!(analysis.labels[0].description, "Pizza");
        assert_eq!(analysis.faces[0].emotions, vec!["радость: VERY_LIKELY".to_string()]);
        assert_eq!(analysis.text, vec!["SALE".to_string()]);
        assert_eq!(analysis.objects[0].description, "Plate");
        assert!(analysis.logos.is_empty());
        assert_eq!(
            analysis.summary(),
            "Вижу: Pizza | Одно лицо на фото | Текст: 'SALE' | Объекты: Plate"
        );
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let cfg = Config::from_json_str(r#"{"teloxide_token":"t"}"#).unwrap();
        let vision = VisionClient::new(&cfg);
        assert!(matches!(
            vision.analyze(b"x").await,
            Err(VendorError::MissingKey { .. })
        ));
    }
}
