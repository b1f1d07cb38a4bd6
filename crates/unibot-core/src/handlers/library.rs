//! `/library`: reader side of the book desk.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    errors::Error,
    handler::{Context, Handler},
    handlers::{callback_action, parse_id, registered_user},
    messaging::{InlineKeyboard, Outbound},
    services::{LibraryService, Loan, LoanStatus, UserDirectory},
    Result,
};

const FEATURE: &str = "book";
const SHELF: usize = 4;

fn status_label(status: LoanStatus) -> &'static str {
    match status {
        LoanStatus::Requested => "⏳ requested",
        LoanStatus::Issued => "✅ ready for pickup",
        LoanStatus::Taken => "📖 with you",
        LoanStatus::Returned => "📄 returned",
    }
}

fn loan_line(loan: &Loan) -> String {
    format!(
        "• {} ({}) - {}\n  Return by: {}\n",
        loan.book.title,
        loan.book.author,
        status_label(loan.status),
        loan.due_at.format("%d.%m.%Y")
    )
}

pub struct LibraryHandler {
    users: Arc<dyn UserDirectory>,
    library: Arc<dyn LibraryService>,
}

impl LibraryHandler {
    pub fn new(users: Arc<dyn UserDirectory>, library: Arc<dyn LibraryService>) -> Self {
        Self { users, library }
    }

    async fn overview(&self, cx: &mut Context<'_>) -> Result<()> {
        let user_id = cx.user_id()?;
        let loans = self.library.loans_by_user(user_id).await?;
        let shelf = self.library.available().await?;

        let mut text = String::from("📚 Library\n\n");
        if !loans.is_empty() {
            text.push_str("📖 Your books:\n");
            for loan in &loans {
                text.push_str(&loan_line(loan));
            }
            text.push('\n');
        }
        if shelf.is_empty() {
            text.push_str("No books are available right now.");
            return cx.show(Outbound::text(text)).await;
        }
        text.push_str("Available to order:");
        let keyboard = shelf.iter().take(SHELF).fold(InlineKeyboard::new(), |kb, b| {
            kb.button(format!("📖 {}", b.title), format!("book:borrow:{}", b.id))
        });
        cx.show(Outbound::text(text).with_keyboard(keyboard)).await
    }

    async fn borrow(&self, cx: &mut Context<'_>, book_id: u64) -> Result<()> {
        let Some(user) = registered_user(cx, self.users.as_ref()).await? else {
            return Ok(());
        };
        let loan = match self
            .library
            .borrow(user.id, &user.full_name(), book_id, cx.now)
            .await
        {
            Ok(loan) => loan,
            Err(Error::NotFound(_)) => return cx.ack(Some("Book not found")).await,
            Err(Error::Service(why)) => {
                warn!(user_id = user.id.0, book_id, reason = %why, "book unavailable");
                return cx
                    .reply_text(
                        "❌ This book is no longer available. Send /library for the current list.",
                    )
                    .await;
            }
            Err(e) => return Err(e),
        };
        info!(user_id = user.id.0, book_id, loan_id = loan.id, "book ordered");
        cx.reply_text(format!(
            "✅ Book ordered!\n\n📖 {}\nAuthor: {}\nReturn by: {}\n\n\
             The book will be ready for pickup within 1-2 working days.",
            loan.book.title,
            loan.book.author,
            loan.due_at.format("%d.%m.%Y")
        ))
        .await
    }
}

#[async_trait]
impl Handler for LibraryHandler {
    async fn handle(&self, cx: &mut Context<'_>) -> Result<()> {
        if cx.is_callback() {
            let action = callback_action(&cx.args, FEATURE).to_string();
            let (verb, id) = action.split_once(':').unwrap_or((action.as_str(), ""));
            return match (verb, parse_id(id)) {
                ("borrow", Some(id)) => self.borrow(cx, id).await,
                ("list", _) => self.overview(cx).await,
                _ => cx.ack(Some("Action not recognized")).await,
            };
        }
        if registered_user(cx, self.users.as_ref()).await?.is_none() {
            return Ok(());
        }
        self.overview(cx).await
    }
}
