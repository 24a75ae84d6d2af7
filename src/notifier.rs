//! The body of a reminder job: post the current balance to the group.

use std::sync::Arc;

use log::info;
use teloxide::{prelude::*, types::ParseMode};
use tokio::sync::Mutex;

use crate::{
    database::Database,
    error::{DatabaseError, DeliveryError},
    formatter::format_reminder,
    scheduler::{JobCallback, JobFuture},
};

/// The reminder text, with the balance read at fire time.
pub async fn build_reminder<D: Database>(
    chat_id: i64,
    database: &Arc<Mutex<D>>,
) -> Result<String, DatabaseError> {
    let balance = database.lock().await.get_balance(chat_id)?;
    Ok(format_reminder(balance))
}

/// Send the reminder to a group.
///
/// Errors go back to the scheduler, which logs them and keeps the job.
pub async fn send_reminder<D: Database>(
    bot: &Bot,
    chat_id: i64,
    database: &Arc<Mutex<D>>,
) -> anyhow::Result<()> {
    let text = build_reminder(chat_id, database).await?;

    bot.send_message(ChatId(chat_id), text)
        .parse_mode(ParseMode::MarkdownV2)
        .await
        .map_err(|e| DeliveryError::new(chat_id, e))?;

    info!("Reminder sent. Chat ID: {chat_id}");
    Ok(())
}

pub fn reminder_callback<D>(bot: Bot, database: Arc<Mutex<D>>) -> JobCallback
where
    D: Database + Send + 'static,
{
    Arc::new(move |chat_id| -> JobFuture {
        let bot = bot.clone();
        let database = database.clone();
        Box::pin(async move { send_reminder(&bot, chat_id, &database).await })
    })
}
