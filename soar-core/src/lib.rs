#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::type_complexity,
    clippy::len_without_is_empty,
    dead_code,
    unused_imports,
    unused_variables
)]

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod repo;

pub use config::{
    get_config_dir, ConfigLoadError, DatabaseConfig, EngineConfig, LoggingConfig, SoarConfig,
};
pub use db::{init_database, init_database_with_url, Database, DatabaseError};
pub use engine::{
    evaluate, resolve, Action, ActionDescriptor, ActionOutcome, ActionRegistry,
    ActionRegistryBuilder, ActionRequest, CascadeOutcome, CascadeTask, DeadLetter, EchoAction,
    PlaybookEngine, PlaybookTemplates, RiskLevel, StepOutcome,
};
pub use error::{retry_async_with_config, CliErrorDisplay, RetryConfig, SoarError, SoarResult};
pub use models::{
    Alert, ApprovalDecision, ApprovalRequest, ApprovalStatus, Case, ErrorBody, ExecutionMode,
    ExecutionStatus, ExecutionStep, InputRequest, InputStatus, OperationResult,
    PlaybookDefinition, PlaybookExecution, PlaybookStep, PlaybookTemplate, PlaybookUpdate,
    StepDefinition, StepStatus, StepStatusChange, StepType, TriggerType,
};
pub use repo::{
    ApprovalRepository, ApprovalStore, CaseRepository, CaseStore, ExecutionRepository,
    ExecutionStore, InMemoryStore, InputRepository, InputRequestStore, PlaybookRepository,
    PlaybookStore, Stores,
};
