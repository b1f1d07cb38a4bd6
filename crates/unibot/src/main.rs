use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use unibot_core::{
    config::Config,
    dispatch::{Dispatcher, EventLoop},
    handlers::{build_router, RegistrationSettings},
    messaging::Responder,
    scanner::ReminderScanner,
    services::{HttpMoodleClient, MoodleClient, Services},
    state::{InMemorySessionStore, SessionStore},
};
use unibot_redis::RedisSessionStore;
use unibot_telegram::{router::run_polling, TelegramResponder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    unibot_core::logging::init("unibot", &cfg.log_level)?;

    let store: Arc<dyn SessionStore> = match &cfg.redis_url {
        Some(url) => Arc::new(
            RedisSessionStore::connect(url, cfg.state_key_prefix.clone(), cfg.state_ttl).await?,
        ),
        None => {
            info!("REDIS_URL not set; sessions are kept in memory");
            Arc::new(InMemorySessionStore::new(
                cfg.state_key_prefix.clone(),
                cfg.state_ttl,
            ))
        }
    };

    let moodle: Option<Arc<dyn MoodleClient>> = match &cfg.moodle_base_url {
        Some(url) => Some(Arc::new(HttpMoodleClient::new(url.clone())?)),
        None => None,
    };
    let services = Services::in_memory(moodle);
    let router = Arc::new(build_router(
        &services,
        RegistrationSettings::from_config(&cfg),
    )?);

    let telegram = TelegramResponder::from_token(cfg.telegram_bot_token.clone());
    let bot = telegram.bot();
    let responder: Arc<dyn Responder> = Arc::new(telegram);

    let dispatcher = Arc::new(Dispatcher::new(router, store, responder.clone()));
    let (tx, rx) = mpsc::channel(cfg.event_queue_capacity);
    let shutdown = CancellationToken::new();

    let event_loop = EventLoop::new(dispatcher);
    let loop_shutdown = shutdown.clone();
    let events = tokio::spawn(async move { event_loop.run(rx, loop_shutdown).await });

    let scanner = ReminderScanner::new(
        services.reminders.clone(),
        responder,
        cfg.reminder_scan_interval,
    );
    let scan_shutdown = shutdown.clone();
    let scans = tokio::spawn(async move { scanner.run(scan_shutdown).await });

    let polled = run_polling(bot, tx).await;

    info!("shutting down");
    shutdown.cancel();
    for (name, task) in [("event loop", events), ("reminder scanner", scans)] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "background task failed");
        }
    }
    polled
}
