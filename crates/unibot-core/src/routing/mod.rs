//! Immutable routing tables, built once at startup, and the stateful router
//! that consults them together with the user's conversation step.

pub mod callbacks;
pub mod commands;
pub mod router;

pub use callbacks::{CallbackTable, CallbackTableBuilder};
pub use commands::{is_command_shaped, parse_command, CommandTable, CommandTableBuilder};
pub use router::{RouteDecision, Router, StepRoute, STEP_ROUTES, WIZARD_FALLBACK_COMMAND};
