use async_trait::async_trait;

use crate::{
    domain::{MessageRef, Recipient},
    messaging::types::Outbound,
    Result,
};

/// Outbound rendering capability.
///
/// The core calls it but never implements rendering itself. Errors are
/// surfaced to the caller and never retried here.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, to: Recipient, message: Outbound) -> Result<MessageRef>;
    async fn edit(&self, msg: MessageRef, message: Outbound) -> Result<()>;
    async fn delete(&self, msg: MessageRef) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
