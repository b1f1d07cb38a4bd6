//! Feature handlers and the routing tables that reach them.
//!
//! Every handler follows the same shape: a command starts or shows something,
//! callbacks carry `feature:action[:id]` payloads, and free text during the
//! feature's own step arrives with an empty command.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::Config,
    handler::{Context, Handler},
    routing::{CallbackTable, CommandTable, Router},
    services::{Role, Services, User, UserDirectory},
    wizard::Wizard,
    Result,
};

mod deanery;
mod documents;
mod library;
mod library_manage;
mod menu;
mod moodle;
mod my_tickets;
mod news;
mod registration;
mod reminder;
mod schedule;
mod send_news;
mod support;
mod tickets;

pub use deanery::DeaneryHandler;
pub use documents::DocumentsHandler;
pub use library::LibraryHandler;
pub use library_manage::LibraryManageHandler;
pub use menu::{FallbackHandler, MenuHandler, StartHandler};
pub use moodle::MoodleHandler;
pub use my_tickets::MyTicketsHandler;
pub use news::NewsHandler;
pub use registration::RegistrationHandler;
pub use reminder::ReminderHandler;
pub use schedule::ScheduleHandler;
pub use send_news::SendNewsHandler;
pub use support::ContactHandler;
pub use tickets::TicketsHandler;

pub(crate) const NOT_REGISTERED: &str =
    "You are not registered yet. Send /register to get started.";

/// Registration knobs taken from the config.
#[derive(Clone, Debug, Default)]
pub struct RegistrationSettings {
    pub verification_code: String,
    /// First name -> role. A classification hint for demo setups, not access
    /// control.
    pub role_markers: HashMap<String, Role>,
}

impl RegistrationSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            verification_code: cfg.verification_code.clone(),
            role_markers: cfg.role_markers.clone(),
        }
    }
}

/// Build both routing tables and wrap them in a router.
pub fn build_router(services: &Services, registration: RegistrationSettings) -> Result<Router> {
    let registration: Arc<dyn Handler> = Arc::new(RegistrationHandler::new(
        services.users.clone(),
        registration,
    ));
    let menu: Arc<dyn Handler> = Arc::new(MenuHandler::new(services.users.clone()));
    let tickets: Arc<dyn Handler> = Arc::new(TicketsHandler::new(
        services.users.clone(),
        services.tickets.clone(),
    ));
    let my_tickets: Arc<dyn Handler> = Arc::new(MyTicketsHandler::new(
        services.users.clone(),
        services.tickets.clone(),
    ));
    let deanery: Arc<dyn Handler> = Arc::new(DeaneryHandler::new(
        services.users.clone(),
        services.documents.clone(),
    ));
    let documents: Arc<dyn Handler> = Arc::new(DocumentsHandler::new(
        services.users.clone(),
        services.documents.clone(),
    ));
    let moodle: Arc<dyn Handler> = Arc::new(MoodleHandler::new(
        services.users.clone(),
        services.moodle.clone(),
    ));
    let reminder: Arc<dyn Handler> = Arc::new(ReminderHandler::new(services.reminders.clone()));
    let library: Arc<dyn Handler> = Arc::new(LibraryHandler::new(
        services.users.clone(),
        services.library.clone(),
    ));
    let library_manage: Arc<dyn Handler> = Arc::new(LibraryManageHandler::new(
        services.users.clone(),
        services.library.clone(),
    ));
    let schedule: Arc<dyn Handler> = Arc::new(ScheduleHandler::new(
        services.users.clone(),
        services.schedule.clone(),
    ));

    let commands = CommandTable::builder()
        .route("/start", Arc::new(StartHandler::new(services.users.clone())))
        .route("/menu", menu.clone())
        .route("/help", menu)
        .route("/register", registration.clone())
        .route("/contact", Arc::new(ContactHandler::new(services.users.clone(), services.tickets.clone())))
        .route("/mytickets", my_tickets.clone())
        .route("/tickets", tickets.clone())
        .route("/deanery", deanery.clone())
        .route("/documents", documents.clone())
        .route("/news", Arc::new(NewsHandler::new(services.news.clone())))
        .route(
            "/send_news",
            Arc::new(SendNewsHandler::new(services.users.clone(), services.news.clone())),
        )
        .route("/moodle", moodle.clone())
        .route("/reminder", reminder.clone())
        .route("/library", library.clone())
        .route("/library_manage", library_manage.clone())
        .route("/schedule", schedule.clone())
        .route("/myschedule", schedule)
        .fallback(Arc::new(FallbackHandler))
        .build()?;

    let callbacks = CallbackTable::builder()
        .route("user_reg:*", registration)
        .route("ticket:*", tickets)
        .route("myticket:*", my_tickets)
        .route("doc:*", deanery)
        .route("doc_admin:*", documents)
        .route("moodle:*", moodle)
        .route("reminder:*", reminder)
        .route("book:*", library)
        .route("lib_manage:*", library_manage)
        .build()?;

    Ok(Router::new(commands, callbacks))
}

/// Look the sender up; tell them to register when they are unknown.
pub(crate) async fn registered_user(
    cx: &Context<'_>,
    users: &dyn UserDirectory,
) -> Result<Option<User>> {
    let user_id = cx.user_id()?;
    match users.get(user_id).await? {
        Some(user) => Ok(Some(user)),
        None => {
            cx.reply_text(NOT_REGISTERED).await?;
            Ok(None)
        }
    }
}

/// Like `registered_user`, but also refuses roles outside `allowed`.
pub(crate) async fn user_with_role(
    cx: &Context<'_>,
    users: &dyn UserDirectory,
    allowed: &[Role],
) -> Result<Option<User>> {
    let Some(user) = registered_user(cx, users).await? else {
        return Ok(None);
    };
    if allowed.contains(&user.role) {
        return Ok(Some(user));
    }
    let who: Vec<&str> = allowed.iter().map(|r| r.label()).collect();
    cx.reply_text(format!("This is only available to: {}.", who.join(", ")))
        .await?;
    Ok(None)
}

pub(crate) fn parse_id(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

/// `"ticket:view:7"` with prefix `"ticket"` -> `"view:7"`.
pub(crate) fn callback_action<'a>(payload: &'a str, feature: &str) -> &'a str {
    payload
        .strip_prefix(feature)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or("")
}

/// Show a validation notice (if any) and the prompt for wherever the user is.
pub(crate) async fn prompt_again(
    cx: &Context<'_>,
    wizard: &Wizard,
    notice: Option<&str>,
) -> Result<()> {
    if let Some(notice) = notice {
        cx.reply_text(notice).await?;
    }
    if let Some(prompt) = wizard.prompt(&*cx.state, cx.now) {
        cx.reply(prompt).await?;
    }
    Ok(())
}
