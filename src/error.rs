/// Errors raised while fetching tours or rendering them to GPX.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Login failed with status {status}: {reason}")]
    Authentication { status: u16, reason: String },

    #[error("Failed to {operation}: status {status}: {reason}")]
    RemoteService {
        operation: &'static str,
        status: u16,
        reason: String,
    },

    #[error("Failed to fetch tips of highlight '{highlight_id}': {reason}")]
    HighlightLookup {
        highlight_id: String,
        reason: String,
    },

    #[error("Invalid tour data: {0}")]
    DataValidation(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response to {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("GPX output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shortens a response body to something fit for an error message.
pub(crate) fn reason_from_body(body: &str) -> String {
    const MAX_REASON: usize = 200;

    let body = body.trim();
    if body.is_empty() {
        return "empty response".to_string();
    }
    if body.chars().count() > MAX_REASON {
        let cut: String = body.chars().take(MAX_REASON).collect();
        return format!("{cut}...");
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_from_body() {
        assert_eq!(reason_from_body("  "), "empty response");
        assert_eq!(reason_from_body("{\"error\":\"nope\"}\n"), "{\"error\":\"nope\"}");

        let long = "x".repeat(500);
        let reason = reason_from_body(&long);
        assert_eq!(reason.chars().count(), 203);
        assert!(reason.ends_with("..."));
    }

    #[test]
    fn test_display() {
        let err = Error::RemoteService {
            operation: "fetch tour",
            status: 404,
            reason: "not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch tour: status 404: not found"
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let err = Error::from(String::from_utf8(vec![0x47, 0xff]).unwrap_err());
        assert!(matches!(err, Error::Utf8(_)));
        assert!(err.to_string().starts_with("GPX output is not valid UTF-8"));
    }
}
