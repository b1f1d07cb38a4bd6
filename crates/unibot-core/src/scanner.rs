//! Background reminder delivery.
//!
//! Runs next to the dispatch loop and shares the reminder service with it;
//! the service guards its own state.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    domain::Recipient,
    messaging::{markdown, Outbound, Responder},
    services::{Reminder, ReminderService},
    Result,
};

#[derive(Clone)]
pub struct ReminderScanner {
    reminders: Arc<dyn ReminderService>,
    responder: Arc<dyn Responder>,
    interval: Duration,
}

impl ReminderScanner {
    pub fn new(
        reminders: Arc<dyn ReminderService>,
        responder: Arc<dyn Responder>,
        interval: Duration,
    ) -> Self {
        Self {
            reminders,
            responder,
            interval,
        }
    }

    /// Scan now, then once per interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "reminder scanner started");
        // First tick fires immediately.
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = self.scan_once(Utc::now()).await {
                        error!(error = %e, "reminder scan failed");
                    }
                }
            }
        }
        info!("reminder scanner stopped");
    }

    /// Deliver every active reminder due at or before `now`. Returns how many
    /// were delivered. A reminder that fails to send stays active for the next
    /// pass.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let active = self.reminders.all_active().await?;
        let due: Vec<&Reminder> = active.iter().filter(|r| r.due_at <= now).collect();
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "due reminders");

        let mut delivered = 0;
        for r in due {
            let msg =
                Outbound::markdown(format!("⏰ *Reminder*\n\n{}", markdown::escape(&r.text)));
            if let Err(e) = self.responder.send(Recipient::User(r.user_id), msg).await {
                error!(reminder_id = r.id, user_id = r.user_id.0, error = %e, "failed to send reminder");
                continue;
            }
            match self.reminders.mark_completed(r.id).await {
                Ok(()) => {
                    delivered += 1;
                    info!(reminder_id = r.id, user_id = r.user_id.0, "reminder sent");
                }
                Err(e) => {
                    error!(reminder_id = r.id, error = %e, "failed to mark reminder completed");
                }
            }
        }
        Ok(delivered)
    }
}
