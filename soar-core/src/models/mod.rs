mod approval;
mod case;
mod execution;
mod input;
mod playbook;
mod response;

pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalStatus};
pub use case::{Alert, Case};
pub use execution::{
    ExecutionMode, ExecutionStatus, ExecutionStep, PlaybookExecution, StepStatus,
    StepStatusChange,
};
pub use input::{InputRequest, InputStatus};
pub use playbook::{
    PlaybookDefinition, PlaybookStep, PlaybookTemplate, PlaybookUpdate, StepDefinition, StepType,
    TriggerType,
};
pub use response::{ErrorBody, OperationResult};
