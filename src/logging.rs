use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,reqwest=warn,teloxide=info";

/// Инициализирует tracing с фильтром из окружения, например `RUST_LOG=debug,reqwest=warn`.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .init();
}

/// Обрезает строку до `max` символов (по char, не по байтам) для вывода в лог.
pub fn compact(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let mut s = value.chars().take(max).collect::<String>();
        s.push_str("...");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_keeps_short_values() {
        assert_eq!(compact("привет", 10), "привет");
    }

    #[test]
    fn compact_cuts_by_chars() {
        assert_eq!(compact("приветмир", 6), "привет...");
    }
}
