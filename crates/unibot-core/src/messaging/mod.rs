//! Messenger-agnostic inbound events and the outbound `Responder` port.

pub mod markdown;
pub mod port;
pub mod types;

pub use port::Responder;
pub use types::{Event, EventKind, InlineButton, InlineKeyboard, Outbound, TextFormat};
