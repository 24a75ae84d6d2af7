//! Core implementation of bot handlers.
//!
//! This is split from `bot_commands` because these functions are the largest
//! subset of logic that can be tested without mocking Telegram APIs. Every
//! function returns the MarkdownV2 text that the bot should reply with.

use chrono::{DateTime, Utc};
use log::{debug, error};

use crate::{
    context::AppContext,
    database::Database,
    error::{DatabaseError, LedgerError},
    formatter::{
        format_balance, format_cancelled, format_confirmation_request, format_expired,
        format_history, format_settings, format_status, format_transaction_committed,
        format_welcome,
    },
    ledger::{self, ConfirmOutcome, PendingTransaction},
    parser::{parse_day_change, parse_time_change},
    types::{Actor, NotificationTime, SettingChange, TransactionKind},
};

/// Register the group (or refresh its title) and greet it.
pub async fn handle_start<D: Database>(
    chat_id: i64,
    title: Option<&str>,
    now: DateTime<Utc>,
    context: &AppContext<D>,
) -> Result<String, DatabaseError> {
    context
        .database
        .lock()
        .await
        .upsert_group(chat_id, title, now)?;
    Ok(format_welcome(title))
}

pub async fn handle_balance<D: Database>(
    chat_id: i64,
    context: &AppContext<D>,
) -> Result<String, DatabaseError> {
    let balance = context.database.lock().await.get_balance(chat_id)?;
    Ok(format_balance(balance))
}

/// The latest transactions, already split into messages that Telegram accepts.
pub async fn handle_history<D: Database>(
    chat_id: i64,
    context: &AppContext<D>,
) -> Result<Vec<String>, DatabaseError> {
    let limit = context.config.history_limit;
    debug!("Producing the history of chat {chat_id} with limit {limit}");

    let entries = context.database.lock().await.get_history(chat_id, limit)?;
    Ok(format_history(&entries))
}

/// Parse the amount typed by a member and ask for confirmation.
pub async fn handle_amount<D: Database>(
    kind: TransactionKind,
    text: &str,
    chat_id: i64,
    actor: Actor,
    now: DateTime<Utc>,
    context: &AppContext<D>,
) -> Result<(PendingTransaction, String), LedgerError> {
    let pending = ledger::prepare(
        kind,
        text,
        chat_id,
        actor,
        now,
        context.config.confirmation_timeout,
        &context.database,
    )
    .await?;

    let message = format_confirmation_request(pending.kind, pending.amount);
    Ok((pending, message))
}

/// Commit or drop the pending transaction, depending on the member's answer.
pub async fn handle_confirmation<D: Database>(
    pending: PendingTransaction,
    affirmative: bool,
    answered_at: DateTime<Utc>,
    committed_at: DateTime<Utc>,
    context: &AppContext<D>,
) -> Result<String, LedgerError> {
    let kind = pending.kind;
    let actor_name = pending.actor.name.clone();

    let outcome = ledger::confirm(
        pending,
        affirmative,
        answered_at,
        committed_at,
        &context.database,
    )
    .await?;
    let message = match outcome {
        ConfirmOutcome::Committed { amount, balance } => {
            format_transaction_committed(kind, amount, &actor_name, balance)
        }
        ConfirmOutcome::Discarded => format_cancelled(),
        ConfirmOutcome::Expired => format_expired(),
    };
    Ok(message)
}

pub async fn handle_settings<D: Database>(
    chat_id: i64,
    context: &AppContext<D>,
) -> Result<String, DatabaseError> {
    let setting = context
        .database
        .lock()
        .await
        .get_notification_setting(chat_id)?;
    Ok(format_settings(&setting))
}

/// Set (or clear, with `off`) the time of the monthly reminder.
pub async fn handle_set_notification_time<D: Database>(
    chat_id: i64,
    text: &str,
    context: &AppContext<D>,
) -> Result<String, LedgerError> {
    let time = parse_time_change(text)?;
    update_notification_setting(chat_id, time, SettingChange::Unchanged, context).await
}

/// Set (or clear, with `off`) the day of the monthly reminder.
pub async fn handle_set_notification_day<D: Database>(
    chat_id: i64,
    text: &str,
    context: &AppContext<D>,
) -> Result<String, LedgerError> {
    let day = parse_day_change(text)?;
    update_notification_setting(chat_id, SettingChange::Unchanged, day, context).await
}

async fn update_notification_setting<D: Database>(
    chat_id: i64,
    time: SettingChange<NotificationTime>,
    day: SettingChange<u8>,
    context: &AppContext<D>,
) -> Result<String, LedgerError> {
    let setting = context
        .database
        .lock()
        .await
        .upsert_notification_setting(chat_id, time, day)?;

    // The setting is saved at this point: a failed rebuild only delays the
    // reminder until the next successful one.
    if let Err(e) = context.scheduler.resync(&context.database).await {
        error!("Cannot rebuild reminder jobs after settings change of chat {chat_id}: {e}");
    }

    Ok(format_settings(&setting))
}

pub async fn handle_status<D: Database>(
    chat_id: i64,
    bot_is_admin: bool,
    context: &AppContext<D>,
) -> Result<String, DatabaseError> {
    let (group, transaction_count) = {
        let database = context.database.lock().await;
        (
            database.get_group(chat_id)?,
            database.count_transactions(chat_id)?,
        )
    };
    let next_reminder = context.scheduler.next_run(chat_id);
    Ok(format_status(
        group.as_ref(),
        transaction_count,
        next_reminder,
        bot_is_admin,
    ))
}
