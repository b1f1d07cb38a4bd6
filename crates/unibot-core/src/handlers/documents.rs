//! `/documents`: staff answer pending dean's office requests with a text or a
//! file.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    handler::{Context, Handler},
    handlers::{callback_action, parse_id, prompt_again, user_with_role},
    messaging::{InlineKeyboard, Outbound},
    services::{Document, DocumentService, DocumentStatus, Role, UserDirectory},
    state::{steps, ConversationState},
    wizard::{Accepts, Input, Outcome, Rejected, Step, Wizard},
    Result,
};

const FEATURE: &str = "doc_admin";
const DOC_ID: &str = "doc_id";

/// Exactly one of text or file.
fn text_xor_file(
    input: &Input<'_>,
    _: &ConversationState,
    _: DateTime<Utc>,
) -> Result<String, Rejected> {
    let Input::Text { text, file } = input else {
        return Err(Rejected::new("Send a text answer or attach a file."));
    };
    match (text.trim(), file) {
        ("", None) => Err(Rejected::new("Send a text answer or attach a file.")),
        ("", Some(file)) => Ok(file.to_string()),
        (text, None) => Ok(text.to_string()),
        (_, Some(_)) => Err(Rejected::new(
            "Send either a text or a file, not both. Attach the file without a caption.",
        )),
    }
}

fn answer_wizard() -> Wizard {
    Wizard::new("doc_response").step(Step::new(
        steps::DOC_RESPONSE,
        "response",
        Accepts::Text,
        Box::new(text_xor_file),
        Box::new(|st, _| {
            Outbound::text(format!(
                "📎 Send the answer for request #{} as a text message or attach a file.",
                st.get(DOC_ID).unwrap_or("?")
            ))
        }),
    ))
}

fn describe(doc: &Document, requester: Option<&str>) -> String {
    let status = match doc.status {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Completed => "completed",
    };
    let mut out = format!(
        "📄 Request #{}\nType: {}\nStatus: {}\nFrom: {}\nFiled: {}\n\n{}",
        doc.id,
        doc.kind.label(),
        status,
        requester.unwrap_or("unknown user"),
        doc.created_at.format("%d.%m.%Y %H:%M"),
        doc.description
    );
    if let Some(response) = &doc.response {
        out.push_str(&format!("\n\nAnswer: {response}"));
    }
    if doc.response_file.is_some() {
        out.push_str("\n\nAnswer: file attached");
    }
    out
}

pub struct DocumentsHandler {
    users: Arc<dyn UserDirectory>,
    documents: Arc<dyn DocumentService>,
    wizard: Wizard,
}

impl DocumentsHandler {
    pub fn new(users: Arc<dyn UserDirectory>, documents: Arc<dyn DocumentService>) -> Self {
        Self {
            users,
            documents,
            wizard: answer_wizard(),
        }
    }

    async fn list(&self, cx: &mut Context<'_>) -> Result<()> {
        let pending: Vec<Document> = self
            .documents
            .list()
            .await?
            .into_iter()
            .filter(|d| d.status == DocumentStatus::Pending)
            .collect();
        if pending.is_empty() {
            return cx.show(Outbound::text("📭 No pending document requests.")).await;
        }
        let keyboard = pending.iter().fold(InlineKeyboard::new(), |kb, d| {
            kb.button(
                format!("#{} {}", d.id, d.kind.label()),
                format!("doc_admin:view:{}", d.id),
            )
        });
        cx.show(
            Outbound::text(format!("📄 Pending requests: {}", pending.len())).with_keyboard(keyboard),
        )
        .await
    }

    async fn view(&self, cx: &mut Context<'_>, id: u64) -> Result<()> {
        let Some(doc) = self.documents.get(id).await? else {
            return cx.ack(Some("Request not found")).await;
        };
        let requester = self.users.get(doc.user_id).await?.map(|u| u.full_name());
        let mut keyboard = InlineKeyboard::new();
        if doc.status == DocumentStatus::Pending {
            keyboard = keyboard.button("✏️ Answer", format!("doc_admin:reply:{id}"));
        }
        keyboard = keyboard.button("⬅️ All requests", "doc_admin:list");
        cx.show(Outbound::text(describe(&doc, requester.as_deref())).with_keyboard(keyboard))
            .await
    }

    async fn start_reply(&self, cx: &mut Context<'_>, id: u64) -> Result<()> {
        match self.documents.get(id).await? {
            Some(d) if d.status == DocumentStatus::Pending => {
                self.wizard.start(cx.state, &[(DOC_ID, &id.to_string())]);
                prompt_again(cx, &self.wizard, None).await
            }
            Some(_) => cx.ack(Some("Request is already answered")).await,
            None => cx.ack(Some("Request not found")).await,
        }
    }

    async fn on_input(&self, cx: &mut Context<'_>) -> Result<()> {
        let manager = cx.user_id()?;
        let text = cx.args.clone();
        let file = cx.event.attachment().map(str::to_string);
        let outcome = self.wizard.apply(
            cx.state,
            Input::Text {
                text: &text,
                file: file.as_deref(),
            },
            cx.now,
        );
        match outcome {
            Outcome::Ready => {}
            Outcome::Rejected(msg) => return prompt_again(cx, &self.wizard, Some(msg.as_str())).await,
            _ => return prompt_again(cx, &self.wizard, None).await,
        }

        let Some(id) = cx.state.get(DOC_ID).and_then(parse_id) else {
            self.wizard.cancel(cx.state);
            return cx.reply_text("Lost track of the request. Open it again from /documents.").await;
        };
        let answer = cx.state.get("response").unwrap_or_default().to_string();
        let (text, file) = match file {
            Some(_) => (None, Some(answer.as_str())),
            None => (Some(answer.as_str()), None),
        };
        let doc = self.documents.add_response(id, text, file, manager).await?;
        self.wizard.finish(cx.state);
        info!(document_id = id, manager = manager.0, with_file = file.is_some(), "document answered");

        let headline = format!("📄 Your request #{id} ({}) is ready.", doc.kind.label());
        let note = match (&doc.response, &doc.response_file) {
            (_, Some(file_id)) => Outbound::text(headline).with_file(file_id.clone()),
            (Some(text), None) => Outbound::text(format!("{headline}\n\n{text}")),
            (None, None) => Outbound::text(headline),
        };
        if let Err(e) = cx.notify(doc.user_id, note).await {
            warn!(document_id = id, error = %e, "failed to notify requester");
        }
        cx.reply_text(format!("✅ Answer for request #{id} sent.")).await
    }
}

#[async_trait]
impl Handler for DocumentsHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if user_with_role(cx, self.users.as_ref(), &[Role::Manager])
            .await?
            .is_none()
        {
            return Ok(());
        }

        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            let (verb, id) = action.split_once(':').unwrap_or((action.as_str(), ""));
            return match (verb, parse_id(id)) {
                ("list", _) => self.list(cx).await,
                ("view", Some(id)) => self.view(cx, id).await,
                ("reply", Some(id)) => self.start_reply(cx, id).await,
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }
        if cx.command.is_empty() && self.wizard.owns(cx.state) {
            return self.on_input(cx).await;
        }
        self.list(cx).await
    }
}
