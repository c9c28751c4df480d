//! Text and clock helpers shared by config, the HTTP remote, and the CLI.

/// Longest response excerpt kept in an error message
const ERROR_EXCERPT_CHARS: usize = 180;

/// Trimmed text, or `None` when only whitespace remains.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Whether `value` carries an `http://` or `https://` scheme.
pub fn is_http_url(value: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// Short excerpt of a response body for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

/// Wall clock in Unix milliseconds; used for `updatedAt`, `createdAt`, and queue ids.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some(" \n ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some("  Nadia ".to_string())),
            Some("Nadia".to_string())
        );
    }

    #[test]
    fn only_http_schemes_are_urls() {
        assert!(is_http_url("https://music.example.com"));
        assert!(is_http_url("http://localhost:8080"));
        assert!(!is_http_url("ftp://music.example.com"));
        assert!(!is_http_url("music.example.com"));
    }

    #[test]
    fn error_excerpts_are_bounded() {
        let body = "e".repeat(1_000);
        assert_eq!(compact_text(&body).chars().count(), ERROR_EXCERPT_CHARS);
        assert_eq!(compact_text("  conflict \n"), "conflict");
    }

    #[test]
    fn clock_is_in_milliseconds() {
        // Any time after 2020 in ms is above 1.5e12.
        assert!(now_millis() > 1_500_000_000_000);
    }
}
