//! `/deanery`: students file document requests with the dean's office.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, user_with_role},
    messaging::{InlineKeyboard, Outbound},
    services::{Document, DocumentKind, DocumentService, DocumentStatus, Role, UserDirectory},
    Result,
};

const FEATURE: &str = "doc";

fn kinds_keyboard() -> InlineKeyboard {
    DocumentKind::ALL.iter().fold(InlineKeyboard::new(), |kb, k| {
        kb.button(k.label(), format!("doc:{}", k.as_str()))
    })
}

fn status_line(doc: &Document) -> String {
    let status = match doc.status {
        DocumentStatus::Pending => "⏳ pending",
        DocumentStatus::Completed => "✅ ready",
    };
    format!(
        "#{} {} ({}), {}",
        doc.id,
        doc.kind.label(),
        doc.created_at.format("%d.%m.%Y"),
        status
    )
}

fn overview(mine: &[Document]) -> String {
    let mut out = String::from("🏛 Dean's office\n\n");
    if mine.is_empty() {
        out.push_str("You have no requests yet.");
    } else {
        out.push_str("Your requests:\n");
        for doc in mine {
            out.push_str(&status_line(doc));
            out.push('\n');
        }
    }
    out.push_str("\n\nChoose a document to request:");
    out
}

pub struct DeaneryHandler {
    users: Arc<dyn UserDirectory>,
    documents: Arc<dyn DocumentService>,
}

impl DeaneryHandler {
    pub fn new(users: Arc<dyn UserDirectory>, documents: Arc<dyn DocumentService>) -> Self {
        Self { users, documents }
    }
}

#[async_trait]
impl Handler for DeaneryHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        let Some(user) = user_with_role(cx, self.users.as_ref(), &[Role::Student]).await? else {
            return Ok(());
        };

        if cx.is_callback() {
            let Ok(kind) = callback_action(&cx.args, FEATURE).parse::<DocumentKind>() else {
                return cx.ack(Some("Unknown document type")).await;
            };
            let doc = self
                .documents
                .create(user.id, kind, &format!("Request for {}", kind.label()))
                .await?;
            info!(document_id = doc.id, user_id = user.id.0, kind = kind.as_str(), "document requested");
            cx.ack(Some("Request sent")).await?;
            let mine = self.documents.list_by_user(user.id).await?;
            return cx
                .show(
                    Outbound::text(format!(
                        "✅ Request #{} for \"{}\" sent to the dean's office.\n\n{}",
                        doc.id,
                        kind.label(),
                        overview(&mine)
                    ))
                    .with_keyboard(kinds_keyboard()),
                )
                .await;
        }

        let mine = self.documents.list_by_user(user.id).await?;
        cx.reply(Outbound::text(overview(&mine)).with_keyboard(kinds_keyboard()))
            .await
    }
}
