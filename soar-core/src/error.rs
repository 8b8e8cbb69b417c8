//! Error types for the SOAR playbook engine.
//!
//! Every fallible engine operation returns [`SoarResult`]. Variants carry a
//! stable code so HTTP controllers and the CLI can report them consistently.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Database | Connection, query, migration errors |
//! | E2001-E2099 | Config | Environment, config file, and validation errors |
//! | E3001-E3099 | Not found | Missing playbooks, executions, steps, requests, actions |
//! | E4001-E4099 | Invalid state | Decisions already made, terminal executions, bad transitions |
//! | E5001-E5099 | Playbook configuration | Steps that cannot run as defined |
//! | E6001-E6099 | Action | Registry actions that raised or reported failure |
//! | E9001-E9099 | General | Internal, IO, serialization, and validation errors |

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_delay as u64)
    }
}

/// The main error type for the playbook engine.
#[derive(Debug, Error)]
pub enum SoarError {
    // ========================================================================
    // Database Errors (E1001-E1099)
    // ========================================================================
    #[error("[E1001] Database connection failed: {message}")]
    DatabaseConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E1002] Database query failed: {0}")]
    DatabaseQueryFailed(String),

    #[error("[E1003] Database migration failed: {0}")]
    DatabaseMigrationFailed(String),

    #[error("[E1004] Database pool unavailable: {0}")]
    DatabasePoolUnavailable(String),

    #[error("[E1005] Unique constraint violated: {0}")]
    UniqueViolation(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    #[error("[E2001] Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("[E2002] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    #[error("[E2003] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Not Found (E3001-E3099)
    // ========================================================================
    #[error("[E3001] Playbook not found: {0}")]
    PlaybookNotFound(Uuid),

    #[error("[E3002] Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("[E3003] Execution step not found: {0}")]
    ExecutionStepNotFound(String),

    #[error("[E3004] Playbook step not found: {0}")]
    PlaybookStepNotFound(Uuid),

    #[error("[E3005] Approval request not found: {0}")]
    ApprovalNotFound(Uuid),

    #[error("[E3006] Input request not found: {0}")]
    InputRequestNotFound(Uuid),

    #[error("[E3007] Action not registered: {0}")]
    ActionNotFound(String),

    #[error("[E3008] Case not found: {0}")]
    CaseNotFound(Uuid),

    // ========================================================================
    // Invalid State (E4001-E4099)
    // ========================================================================
    #[error("[E4001] Approval request {0} has already been decided")]
    ApprovalAlreadyDecided(Uuid),

    #[error("[E4002] Input request {0} has already been submitted")]
    InputAlreadySubmitted(Uuid),

    #[error("[E4003] Step type '{0}' cannot auto-execute")]
    CannotAutoExecute(String),

    #[error("[E4004] Execution {id} is already {status}")]
    ExecutionFinished { id: Uuid, status: String },

    #[error("[E4005] Invalid step status transition from {from} to {to}")]
    InvalidStepTransition { from: String, to: String },

    #[error("[E4006] Next step {step} at order {order} is already {status}")]
    SuccessorNotPending {
        step: Uuid,
        order: i32,
        status: String,
    },

    // ========================================================================
    // Playbook Configuration (E5001-E5099)
    // ========================================================================
    #[error("[E5001] Automation step {0} has no actionId")]
    MissingActionId(Uuid),

    #[error("[E5002] Invalid step configuration for {step}: {message}")]
    InvalidStepConfig { step: Uuid, message: String },

    // ========================================================================
    // Action Errors (E6001-E6099)
    // ========================================================================
    #[error("[E6001] Action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    #[error("[E9002] Validation error: {0}")]
    ValidationError(String),

    #[error("[E9003] IO error: {0}")]
    IoError(String),

    #[error("[E9004] Serialization error: {0}")]
    SerializationError(String),
}

impl SoarError {
    pub fn database_connection_failed(message: impl Into<String>) -> Self {
        SoarError::DatabaseConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn action_failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        SoarError::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type SoarResult<T> = Result<T, SoarError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<sqlx::Error> for SoarError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => SoarError::DatabasePoolUnavailable(err.to_string()),
            sqlx::Error::PoolClosed => {
                SoarError::DatabasePoolUnavailable("Connection pool is closed".to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                SoarError::database_connection_failed(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                SoarError::UniqueViolation(db_err.to_string())
            }
            sqlx::Error::Database(db_err) => SoarError::DatabaseQueryFailed(db_err.to_string()),
            _ => SoarError::DatabaseQueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for SoarError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SoarError::DatabaseMigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SoarError {
    fn from(err: serde_json::Error) -> Self {
        SoarError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SoarError {
    fn from(err: serde_yaml::Error) -> Self {
        SoarError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for SoarError {
    fn from(err: std::io::Error) -> Self {
        SoarError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for SoarError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => SoarError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => SoarError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => SoarError::ConfigParseError(err.to_string()),
        }
    }
}

impl From<crate::db::DatabaseError> for SoarError {
    fn from(err: crate::db::DatabaseError) -> Self {
        match err {
            crate::db::DatabaseError::MissingEnvVar(name) => SoarError::MissingEnvVar(name),
            crate::db::DatabaseError::ConnectionFailed(e) => e.into(),
            crate::db::DatabaseError::MigrationFailed(e) => e.into(),
        }
    }
}

impl From<crate::config::ConfigLoadError> for SoarError {
    fn from(err: crate::config::ConfigLoadError) -> Self {
        match err {
            crate::config::ConfigLoadError::Config(e) => e.into(),
            crate::config::ConfigLoadError::MissingRequired(key) => SoarError::InvalidConfigValue {
                key,
                message: "Missing required value".to_string(),
            },
            crate::config::ConfigLoadError::InvalidValue { key, message } => {
                SoarError::InvalidConfigValue { key, message }
            }
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl SoarError {
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            SoarError::DatabaseConnectionFailed { .. }
                | SoarError::DatabaseQueryFailed(_)
                | SoarError::DatabaseMigrationFailed(_)
                | SoarError::DatabasePoolUnavailable(_)
                | SoarError::UniqueViolation(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SoarError::PlaybookNotFound(_)
                | SoarError::ExecutionNotFound(_)
                | SoarError::ExecutionStepNotFound(_)
                | SoarError::PlaybookStepNotFound(_)
                | SoarError::ApprovalNotFound(_)
                | SoarError::InputRequestNotFound(_)
                | SoarError::ActionNotFound(_)
                | SoarError::CaseNotFound(_)
        )
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            SoarError::ApprovalAlreadyDecided(_)
                | SoarError::InputAlreadySubmitted(_)
                | SoarError::CannotAutoExecute(_)
                | SoarError::ExecutionFinished { .. }
                | SoarError::InvalidStepTransition { .. }
                | SoarError::SuccessorNotPending { .. }
        )
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SoarError::MissingActionId(_) | SoarError::InvalidStepConfig { .. }
        )
    }

    /// Returns true if the operation might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SoarError::DatabasePoolUnavailable(_) | SoarError::DatabaseConnectionFailed { .. }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SoarError::DatabaseConnectionFailed { .. } => "E1001",
            SoarError::DatabaseQueryFailed(_) => "E1002",
            SoarError::DatabaseMigrationFailed(_) => "E1003",
            SoarError::DatabasePoolUnavailable(_) => "E1004",
            SoarError::UniqueViolation(_) => "E1005",
            SoarError::MissingEnvVar(_) => "E2001",
            SoarError::ConfigParseError(_) => "E2002",
            SoarError::InvalidConfigValue { .. } => "E2003",
            SoarError::PlaybookNotFound(_) => "E3001",
            SoarError::ExecutionNotFound(_) => "E3002",
            SoarError::ExecutionStepNotFound(_) => "E3003",
            SoarError::PlaybookStepNotFound(_) => "E3004",
            SoarError::ApprovalNotFound(_) => "E3005",
            SoarError::InputRequestNotFound(_) => "E3006",
            SoarError::ActionNotFound(_) => "E3007",
            SoarError::CaseNotFound(_) => "E3008",
            SoarError::ApprovalAlreadyDecided(_) => "E4001",
            SoarError::InputAlreadySubmitted(_) => "E4002",
            SoarError::CannotAutoExecute(_) => "E4003",
            SoarError::ExecutionFinished { .. } => "E4004",
            SoarError::InvalidStepTransition { .. } => "E4005",
            SoarError::SuccessorNotPending { .. } => "E4006",
            SoarError::MissingActionId(_) => "E5001",
            SoarError::InvalidStepConfig { .. } => "E5002",
            SoarError::ActionFailed { .. } => "E6001",
            SoarError::Internal(_) => "E9001",
            SoarError::ValidationError(_) => "E9002",
            SoarError::IoError(_) => "E9003",
            SoarError::SerializationError(_) => "E9004",
        }
    }

    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            SoarError::DatabaseConnectionFailed { .. } => {
                Some("Check that PostgreSQL is running and DATABASE_URL is correct")
            }
            SoarError::DatabasePoolUnavailable(_) => {
                Some("The database is busy. Try again in a few seconds")
            }
            SoarError::MissingEnvVar(_) => {
                Some("Create a .env file or set the environment variable")
            }
            SoarError::DatabaseMigrationFailed(_) => Some("Run 'soar init' against a clean schema"),
            SoarError::PlaybookNotFound(_) => {
                Some("Run 'soar playbooks list --tenant <id>' to see available playbooks")
            }
            SoarError::MissingActionId(_) => Some("Set actionId on every automation step"),
            SoarError::SuccessorNotPending { .. } => {
                Some("Point true_step and false_step at steps that have not run yet")
            }
            SoarError::ActionNotFound(_) => {
                Some("Register the action with the engine's action registry before running")
            }
            SoarError::ApprovalAlreadyDecided(_) | SoarError::InputAlreadySubmitted(_) => {
                Some("Run 'soar approvals list' or 'soar inputs list' for pending requests")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// Retry utilities
// ============================================================================

/// Execute an async operation, retrying transient failures per `config`.
pub async fn retry_async_with_config<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
) -> SoarResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = SoarResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt + 1,
                        attempt
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || attempt + 1 >= config.max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with its suggestion.
pub struct CliErrorDisplay<'a> {
    error: &'a SoarError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a SoarError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::new_v4();
        let err = SoarError::PlaybookNotFound(id);
        assert!(err.to_string().contains("E3001"));
        assert!(err.to_string().contains(&id.to_string()));

        let err = SoarError::action_failed("isolate_host", "edr unreachable");
        assert!(err.to_string().contains("E6001"));
        assert!(err.to_string().contains("isolate_host"));
    }

    #[test]
    fn test_error_categorization() {
        let not_found = SoarError::ApprovalNotFound(Uuid::new_v4());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_invalid_state());

        let decided = SoarError::ApprovalAlreadyDecided(Uuid::new_v4());
        assert!(decided.is_invalid_state());
        assert!(!decided.is_not_found());

        let missing = SoarError::MissingActionId(Uuid::new_v4());
        assert!(missing.is_configuration_error());

        let db = SoarError::database_connection_failed("refused");
        assert!(db.is_database_error());
        assert!(db.is_transient());
        assert!(!SoarError::DatabaseQueryFailed("syntax".to_string()).is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SoarError::CannotAutoExecute("manual".to_string()).error_code(),
            "E4003"
        );
        assert_eq!(
            SoarError::MissingActionId(Uuid::nil()).error_code(),
            "E5001"
        );
        assert_eq!(
            SoarError::Internal("boom".to_string()).error_code(),
            "E9001"
        );
    }

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };

        let result: SoarResult<()> = retry_async_with_config(
            || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(SoarError::ExecutionNotFound(Uuid::nil())) }
            },
            &config,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        };

        let result = retry_async_with_config(
            || {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SoarError::DatabasePoolUnavailable("busy".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn test_cli_error_display() {
        let err = SoarError::MissingEnvVar("DATABASE_URL".to_string());
        let output = CliErrorDisplay::new(&err).to_string();

        assert!(output.contains("DATABASE_URL"));
        assert!(output.contains("Suggestion"));

        let output = CliErrorDisplay::new(&err).without_suggestion().to_string();
        assert!(!output.contains("Suggestion"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: SoarError = json_err.into();
        assert!(matches!(err, SoarError::SerializationError(_)));
    }
}
