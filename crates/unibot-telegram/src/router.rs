use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use unibot_core::messaging::Event;

use crate::updates::{callback_event, message_event};

/// Long-poll Telegram and push converted events into `events` until Ctrl-C.
///
/// Teloxide hands each chat's updates over one at a time, so a user's events
/// enter the queue in arrival order. A full queue applies backpressure to the
/// poller instead of dropping updates.
pub async fn run_polling(bot: Bot, events: mpsc::Sender<Event>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telegram bot started"),
        Err(e) => warn!(error = %e, "get_me failed; polling anyway"),
    }

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(forward_callback))
        .branch(Update::filter_message().endpoint(forward_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![events])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram polling stopped");
    Ok(())
}

async fn forward(events: &mpsc::Sender<Event>, event: Event) {
    if events.send(event).await.is_err() {
        warn!("event queue closed; dropping update");
    }
}

async fn forward_message(msg: Message, events: mpsc::Sender<Event>) -> ResponseResult<()> {
    match message_event(&msg) {
        Some(event) => forward(&events, event).await,
        None => debug!(chat_id = msg.chat.id.0, "ignoring message without text or file"),
    }
    Ok(())
}

async fn forward_callback(q: CallbackQuery, events: mpsc::Sender<Event>) -> ResponseResult<()> {
    forward(&events, callback_event(&q)).await;
    Ok(())
}
