//! The runtime command engine: operational-state machine, dispatch,
//! categories, preemption, command actors, and result recovery.

pub mod actor;
pub mod builtin;
pub mod categories;
pub mod command;
pub mod engine;
pub mod result_cache;
pub mod state_machine;

pub use command::{
    After, CommandContext, CommandError, CommandHandle, CommandHandler, CommandResult,
    CommandValue, Goal, HandlerBindings, HandlerFactory, Step, StopReason,
};
pub use engine::{goal, CategoryAvailability, EngineConfig, ExecutingCommand, RuntimeEngine};
pub use state_machine::StateMachine;
