//! Domain-service ports the handlers talk to, each with an in-memory
//! implementation. The in-memory state sits behind a mutex so the dispatch
//! path and the reminder scanner can share one instance.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{errors::Error, Result};

pub mod deanery;
pub mod library;
pub mod moodle;
pub mod news;
pub mod reminders;
pub mod schedule;
pub mod support;
pub mod users;

pub use deanery::{Document, DocumentKind, DocumentService, DocumentStatus, InMemoryDocumentService};
pub use library::{Book, InMemoryLibraryService, LibraryService, Loan, LoanStatus};
pub use moodle::{Course, HttpMoodleClient, MoodleClient, SiteInfo};
pub use news::{InMemoryNewsService, NewsItem, NewsService};
pub use reminders::{InMemoryReminderService, Reminder, ReminderService, ReminderStatus};
pub use schedule::{InMemoryScheduleService, Lesson, ScheduleService};
pub use support::{InMemoryTicketService, Ticket, TicketService, TicketStatus};
pub use users::{InMemoryUserDirectory, NewUser, Role, User, UserDirectory};

/// Everything the feature handlers depend on.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserDirectory>,
    pub tickets: Arc<dyn TicketService>,
    pub documents: Arc<dyn DocumentService>,
    pub news: Arc<dyn NewsService>,
    pub reminders: Arc<dyn ReminderService>,
    pub library: Arc<dyn LibraryService>,
    pub schedule: Arc<dyn ScheduleService>,
    /// `None` when no Moodle instance is configured.
    pub moodle: Option<Arc<dyn MoodleClient>>,
}

impl Services {
    pub fn in_memory(moodle: Option<Arc<dyn MoodleClient>>) -> Self {
        Self {
            users: Arc::new(InMemoryUserDirectory::new()),
            tickets: Arc::new(InMemoryTicketService::new()),
            documents: Arc::new(InMemoryDocumentService::new()),
            news: Arc::new(InMemoryNewsService::seeded()),
            reminders: Arc::new(InMemoryReminderService::new()),
            library: Arc::new(InMemoryLibraryService::seeded()),
            schedule: Arc::new(InMemoryScheduleService::new()),
            moodle,
        }
    }
}

pub(crate) fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| Error::Service(format!("{what} lock poisoned")))
}
