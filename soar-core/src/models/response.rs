use serde::{Deserialize, Serialize};

use crate::error::{SoarError, SoarResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// `{success, data}` / `{success: false, error}` envelope returned to controllers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &SoarError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: error.error_code().to_string(),
                message: error.to_string(),
            }),
        }
    }
}

impl<T> From<SoarResult<T>> for OperationResult<T> {
    fn from(result: SoarResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_success_envelope() {
        let result: OperationResult<u32> = Ok(7).into();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": true, "data": 7})
        );
    }

    #[test]
    fn test_error_envelope() {
        let result: OperationResult<u32> =
            SoarResult::Err(SoarError::ApprovalNotFound(Uuid::nil())).into();
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["code"], json!("E3005"));
        assert!(value.get("data").is_none());
    }
}
