use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Board posts live in the same append-only log as direct messages; their
/// target column holds "thread:<id>" instead of a partner handle. Handles
/// containing ':' are rejected at registration so the two address spaces
/// stay disjoint.
pub fn thread_target(thread_id: Id) -> String {
    format!("thread:{thread_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub handle: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub digest: String, // credential digest (hidden from API clients)
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewIdentity {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Id,
    pub sender: String,
    pub target: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub theme: Option<String>,
}

/// Repo-level input; the sender comes from the authenticated caller and the
/// body has already passed surface sanitization.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub target: String,
    pub body: String,
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Thread {
    pub id: Id,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            _ => None,
        }
    }
}

/// Unique per ordered (from, to) pair regardless of status; approval is the
/// only transition and it is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FriendRequest {
    pub from: String,
    pub to: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}
