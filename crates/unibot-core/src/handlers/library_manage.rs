//! `/library_manage`: staff side of the book desk. Loans move
//! requested -> issued -> taken -> returned, one button press per step.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    domain::UserId,
    errors::Error,
    handler::{Context, Handler},
    handlers::{callback_action, parse_id, user_with_role},
    messaging::{InlineKeyboard, Outbound},
    services::{LibraryService, Loan, LoanStatus, Role, UserDirectory},
    Result,
};

const FEATURE: &str = "lib_manage";
const PER_GROUP: usize = 10;
const BUTTON_CHARS: usize = 40;

fn button_label(prefix: &str, title: &str) -> String {
    let label = format!("{prefix}: {title}");
    if label.chars().count() <= BUTTON_CHARS {
        return label;
    }
    let cut: String = label.chars().take(BUTTON_CHARS - 3).collect();
    format!("{cut}...")
}

/// Heading, button prefix and callback verb for each loan stage.
fn stage(status: LoanStatus) -> Option<(&'static str, &'static str, &'static str)> {
    match status {
        LoanStatus::Requested => Some(("⏳ Requested:", "✅ Issued", "issue")),
        LoanStatus::Issued => Some(("📦 Issued, awaiting pickup:", "✅ Picked up", "taken")),
        LoanStatus::Taken => Some(("📖 Picked up:", "📚 Returned", "returned")),
        LoanStatus::Returned => None,
    }
}

fn parse_target(rest: &str) -> Option<(UserId, u64)> {
    let (user, book) = rest.split_once(':')?;
    Some((UserId(user.trim().parse().ok()?), parse_id(book)?))
}

pub struct LibraryManageHandler {
    users: Arc<dyn UserDirectory>,
    library: Arc<dyn LibraryService>,
}

impl LibraryManageHandler {
    pub fn new(users: Arc<dyn UserDirectory>, library: Arc<dyn LibraryService>) -> Self {
        Self { users, library }
    }

    async fn list(&self, cx: &mut Context<'_>) -> Result<()> {
        let loans = self.library.active_loans().await?;
        if loans.is_empty() {
            return cx
                .show(Outbound::text("📚 Library desk\n\n✅ No active book requests."))
                .await;
        }

        let mut text = format!("📚 Library desk\n\nActive requests: {}\n", loans.len());
        let mut keyboard = InlineKeyboard::new();
        for status in [LoanStatus::Requested, LoanStatus::Issued, LoanStatus::Taken] {
            let Some((heading, button, verb)) = stage(status) else {
                continue;
            };
            let group: Vec<&Loan> = loans.iter().filter(|l| l.status == status).collect();
            debug!(status = %status, count = group.len(), "library loans");
            if group.is_empty() {
                continue;
            }
            text.push_str(&format!("\n{heading}\n"));
            for loan in group.into_iter().take(PER_GROUP) {
                text.push_str(&format!("• {} - {}", loan.book.title, loan.borrower));
                if let Some(at) = loan.taken_at {
                    text.push_str(&format!(" (since {})", at.format("%d.%m.%Y %H:%M")));
                }
                text.push('\n');
                keyboard = keyboard.button(
                    button_label(button, &loan.book.title),
                    format!("lib_manage:{verb}:{}:{}", loan.user_id.0, loan.book.id),
                );
            }
        }
        cx.show(Outbound::text(text).with_keyboard(keyboard)).await
    }

    async fn advance(
        &self,
        cx: &mut Context<'_>,
        verb: &str,
        user_id: UserId,
        book_id: u64,
    ) -> Result<()> {
        let result = match verb {
            "issue" => self.library.issue(user_id, book_id, cx.now).await,
            "taken" => self.library.mark_taken(user_id, book_id, cx.now).await,
            _ => self.library.mark_returned(user_id, book_id).await,
        };
        let loan = match result {
            Ok(loan) => loan,
            Err(Error::NotFound(what)) => {
                warn!(user_id = user_id.0, book_id, verb, missing = %what, "library step refused");
                return cx
                    .reply_text(
                        "❌ That request has already moved on. Send /library_manage to refresh.",
                    )
                    .await;
            }
            Err(e) => return Err(e),
        };
        info!(user_id = user_id.0, book_id, status = %loan.status, "library loan updated");

        let title = &loan.book.title;
        let done = match loan.status {
            LoanStatus::Issued => {
                let note = Outbound::text(format!(
                    "✅ The book \"{title}\" is ready for pickup!\n\nReturn by: {}\n\n\
                     You can collect it at the library.",
                    loan.due_at.format("%d.%m.%Y")
                ));
                match cx.notify(user_id, note).await {
                    Ok(()) => format!(
                        "✅ \"{title}\" is marked ready for pickup.\n\n{} has been notified.",
                        loan.borrower
                    ),
                    Err(e) => {
                        warn!(user_id = user_id.0, book_id, error = %e, "failed to notify reader");
                        format!(
                            "✅ \"{title}\" is marked ready for pickup.\n\n{} could not be notified.",
                            loan.borrower
                        )
                    }
                }
            }
            LoanStatus::Taken => {
                format!("✅ \"{title}\" is marked as picked up by {}.", loan.borrower)
            }
            _ => format!(
                "✅ \"{title}\" is back in the library and can be ordered again.\n\nReturned by {}.",
                loan.borrower
            ),
        };
        cx.reply_text(format!("{done}\n\nSend /library_manage to see all requests."))
            .await
    }
}

#[async_trait]
impl Handler for LibraryManageHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if user_with_role(cx, self.users.as_ref(), &[Role::Employee, Role::Manager])
            .await?
            .is_none()
        {
            return Ok(());
        }

        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            let (verb, rest) = action.split_once(':').unwrap_or((action.as_str(), ""));
            return match (verb, parse_target(rest)) {
                ("list", _) => self.list(cx).await,
                ("issue" | "taken" | "returned", Some((user_id, book_id))) => {
                    self.advance(cx, verb, user_id, book_id).await
                }
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }
        self.list(cx).await
    }
}
