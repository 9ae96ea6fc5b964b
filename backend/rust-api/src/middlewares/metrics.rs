use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per method, normalized path and status.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Collapses user, lesson and session ids into `{id}` to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_numeric_id(segment) || is_session_id(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// `{lesson_id}-{user_id}`
fn is_session_id(s: &str) -> bool {
    match s.split_once('-') {
        Some((lesson, user)) => is_numeric_id(lesson) && is_numeric_id(user),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/lessons/result/12-4455"),
            "/api/lessons/result/{id}"
        );
        assert_eq!(
            normalize_path("/api/user/123/change-language"),
            "/api/user/{id}/change-language"
        );
        assert_eq!(normalize_path("/api/lessons/add-lesson"), "/api/lessons/add-lesson");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_is_session_id() {
        assert!(is_session_id("3-42"));
        assert!(!is_session_id("add-lesson"));
        assert!(!is_session_id("3-"));
        assert!(!is_session_id("42"));
    }
}
