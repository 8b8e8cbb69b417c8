mod actions;
mod approval;
mod cascade;
pub mod condition;
mod input;
mod orchestrator;
pub mod resolver;
mod templates;

pub use actions::{
    Action, ActionDescriptor, ActionOutcome, ActionRegistry, ActionRegistryBuilder, ActionRequest,
    EchoAction, RiskLevel,
};
pub use cascade::{CascadeOutcome, CascadeTask, DeadLetter};
pub use condition::evaluate;
pub use orchestrator::{PlaybookEngine, StepOutcome};
pub use resolver::resolve;
pub use templates::PlaybookTemplates;
