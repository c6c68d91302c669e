//! Analysis request (order) models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Registered,
    Complete,
    Canceled,
    Deleted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Registered => "registered",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::Deleted => "deleted",
        }
    }

    /// The request state machine:
    /// draft -> registered -> {complete, canceled}, and draft -> deleted
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Registered)
                | (Self::Draft, Self::Deleted)
                | (Self::Registered, Self::Complete)
                | (Self::Registered, Self::Canceled)
        )
    }

    /// Drafts and deleted requests never appear in request listings
    pub fn is_listed(&self) -> bool {
        !matches!(self, Self::Draft | Self::Deleted)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "registered" => Ok(Self::Registered),
            "complete" | "completed" => Ok(Self::Complete),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Unknown request status: {}", s)),
        }
    }
}

/// Terminal outcome an admin may resolve a registered request to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Complete,
    Canceled,
}

impl Resolution {
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Complete => RequestStatus::Complete,
            Self::Canceled => RequestStatus::Canceled,
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<RequestStatus>()? {
            RequestStatus::Complete => Ok(Self::Complete),
            RequestStatus::Canceled => Ok(Self::Canceled),
            other => Err(format!("Requests cannot be resolved to {}", other)),
        }
    }
}

/// An analysis request joined with the logins of its owner and resolving admin
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRequest {
    pub id: i64,
    pub owner_id: i64,
    pub owner_login: Option<String>,
    pub status: String,
    pub created_at: String,
    pub formed_at: Option<String>,
    pub completed_at: Option<String>,
    pub admin_id: Option<i64>,
    pub admin_login: Option<String>,
}

impl AnalysisRequest {
    pub fn status_enum(&self) -> RequestStatus {
        // The CHECK constraint on the column keeps this total
        self.status.parse().unwrap_or(RequestStatus::Draft)
    }
}

/// A catalog modeling as it appears inside one request, with that request's parameters
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ModelingView {
    pub modeling_id: i64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: i64,
    pub is_deleted: bool,
    pub node_quantity: i64,
    pub queue_size: i64,
    pub client_quantity: i64,
}

/// A request together with its composed modeling list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestView {
    pub request: AnalysisRequest,
    pub modelings: Vec<ModelingView>,
}

/// Per-field presence: `None` leaves the stored value alone, `Some(0)` stores zero
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AssociationPatch {
    pub node_quantity: Option<i64>,
    pub queue_size: Option<i64>,
    pub client_quantity: Option<i64>,
}

/// Typed filter for request listings; date bounds are inclusive and apply to `formed_at`
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub formed_from: Option<chrono::DateTime<chrono::Utc>>,
    pub formed_to: Option<chrono::DateTime<chrono::Utc>>,
}

/// Raw query parameters of the request listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RequestStatus; 5] = [
        RequestStatus::Draft,
        RequestStatus::Registered,
        RequestStatus::Complete,
        RequestStatus::Canceled,
        RequestStatus::Deleted,
    ];

    #[test]
    fn test_allowed_transitions() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (RequestStatus::Draft, RequestStatus::Registered),
                (RequestStatus::Draft, RequestStatus::Deleted),
                (RequestStatus::Registered, RequestStatus::Complete),
                (RequestStatus::Registered, RequestStatus::Canceled),
            ]
        );
    }

    #[test]
    fn test_status_parsing() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert_eq!("CANCELLED".parse::<RequestStatus>().unwrap(), RequestStatus::Canceled);
        assert!("approved".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("complete".parse::<Resolution>().unwrap(), Resolution::Complete);
        assert_eq!("CANCELED".parse::<Resolution>().unwrap(), Resolution::Canceled);
        assert!("registered".parse::<Resolution>().is_err());
        assert!("deleted".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_patch_presence_survives_zero() {
        let patch: AssociationPatch = serde_json::from_str(r#"{"queue_size": 0}"#).unwrap();
        assert_eq!(patch.queue_size, Some(0));
        assert_eq!(patch.node_quantity, None);

        let empty: AssociationPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, AssociationPatch::default());
    }
}
