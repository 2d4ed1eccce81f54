use thiserror::Error;

/// Ошибка обращения к внешнему API (YandexGPT, SpeechKit, Vision, Кинопоиск, Imgflip).
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("{service}: не задан ключ API")]
    MissingKey { service: &'static str },
    #[error("{service}: функция отключена в настройках")]
    Disabled { service: &'static str },
    #[error("{service}: ошибка запроса: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service}: HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{service}: неожиданный ответ: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
}

impl VendorError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| VendorError::Http { service, source }
    }

    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        VendorError::Malformed {
            service,
            detail: detail.into(),
        }
    }
}

/// Пропускает успешный ответ, иначе `Status` с укороченным телом.
pub async fn ensure_success(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, VendorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(VendorError::Status {
        service,
        status,
        body: crate::logging::compact(&body, 300),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_service() {
        let err = VendorError::MissingKey { service: "kinopoisk" };
        assert!(err.to_string().contains("kinopoisk"));
        let err = VendorError::malformed("vision", "нет responses");
        assert_eq!(err.to_string(), "vision: неожиданный ответ: нет responses");
    }
}
