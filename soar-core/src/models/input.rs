use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "input_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InputStatus {
    Pending,
    Submitted,
}

impl std::fmt::Display for InputStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputStatus::Pending => write!(f, "pending"),
            InputStatus::Submitted => write!(f, "submitted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InputRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub status: InputStatus,
    pub prompt: Option<String>,
    pub input_schema: Value,
    pub requested_at: DateTime<Utc>,
    pub submitted_by: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub input_data: Option<Value>,
}

impl InputRequest {
    pub fn new(
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
        prompt: Option<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            execution_id,
            step_id,
            status: InputStatus::Pending,
            prompt,
            input_schema,
            requested_at: Utc::now(),
            submitted_by: None,
            submitted_at: None,
            input_data: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InputStatus::Pending
    }

    pub fn submit(&mut self, user_id: Uuid, data: Value) {
        self.status = InputStatus::Submitted;
        self.submitted_by = Some(user_id);
        self.submitted_at = Some(Utc::now());
        self.input_data = Some(data);
    }
}
