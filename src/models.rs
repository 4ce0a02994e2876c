//! Bridge HTTP models.
//!
//! Request parameter types and the JSON response wrapper used by every
//! endpoint. Tally records themselves live in `tally_link::models`.

use serde::{Deserialize, Serialize};
use tally_link::ErrorKind;

// ============================================================================
// Request parameters
// ============================================================================

/// `?company=` query for the per-company collection endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct CompanyQuery {
    pub company: Option<String>,
}

impl CompanyQuery {
    /// The company name, if present and non-blank. Not trimmed: Tally
    /// company names are matched exactly.
    pub fn company(&self) -> Option<&str> {
        self.company.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Partial configuration update; omitted fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigBody {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
}

// ============================================================================
// API Response Wrapper
// ============================================================================

/// Generic JSON API response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_kind: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error_kind: None,
        }
    }

    pub fn error(message: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_kind: kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_shape() {
        let resp = ApiResponse::error("Tally unreachable", Some(ErrorKind::Unreachable));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "UNREACHABLE");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn blank_company_is_missing() {
        let q = CompanyQuery {
            company: Some("  ".into()),
        };
        assert_eq!(q.company(), None);
        let q = CompanyQuery {
            company: Some("Zyver ".into()),
        };
        assert_eq!(q.company(), Some("Zyver "));
    }
}
