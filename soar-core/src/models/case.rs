use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only projection of a case owned by case management.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Case {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub severity: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Case {
    pub fn new(tenant_id: Uuid, title: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            title: title.into(),
            description: None,
            severity: severity.into(),
            status: "open".to_string(),
            metadata: Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub case_id: Uuid,
    pub title: String,
    pub severity: String,
    pub source: String,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(case: &Case, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: case.tenant_id,
            case_id: case.id,
            title: title.into(),
            severity: case.severity.clone(),
            source: source.into(),
            payload: Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}
