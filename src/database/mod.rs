//! Durable storage of groups, transactions and reminder settings.

use chrono::{DateTime, Utc};

use crate::{
    error::DatabaseError,
    types::{
        ActiveNotification, Amount, Group, HistoryEntry, NewTransaction, NotificationSetting,
        NotificationTime, RecordedTransaction, SettingChange,
    },
};

type DatabaseResult<T> = Result<T, DatabaseError>;

pub mod sqlite;

/// This trait abstracts over the type of database.

/// Transactions are an append-only log: there is no way to update or delete
/// them, and the balance is always derived from the log.
pub trait Database {
    /// Create the group, or refresh its title if it already exists.
    ///
    /// The join timestamp is only set on the first insert.
    fn upsert_group(
        &mut self,
        chat_id: i64,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> DatabaseResult<()>;

    /// Get the group with the given *chat_id*, if it exists.
    fn get_group(&self, chat_id: i64) -> DatabaseResult<Option<Group>>;

    /// Append a transaction to the log and return its ID with the new balance.
    ///
    /// The amount must be positive. If the group does not exist, it is created
    /// (without a title) in the same database transaction. The balance is read
    /// in that transaction too: if it cannot be read, nothing is written.
    fn record_transaction(
        &mut self,
        chat_id: i64,
        transaction: &NewTransaction,
        now: DateTime<Utc>,
    ) -> DatabaseResult<RecordedTransaction>;

    /// Deposits minus withdrawals. Unknown groups have a balance of zero.
    fn get_balance(&self, chat_id: i64) -> DatabaseResult<Amount>;

    /// Get at most *limit* transactions, newest first.
    fn get_history(&self, chat_id: i64, limit: usize) -> DatabaseResult<Vec<HistoryEntry>>;

    /// Count all transactions of a group.
    fn count_transactions(&self, chat_id: i64) -> DatabaseResult<usize>;

    /// Update the reminder settings of a group and return the stored result.
    ///
    /// Fields marked as [`SettingChange::Unchanged`] keep their stored value
    /// (or stay empty if the group has no settings yet).
    fn upsert_notification_setting(
        &mut self,
        chat_id: i64,
        time: SettingChange<NotificationTime>,
        day: SettingChange<u8>,
    ) -> DatabaseResult<NotificationSetting>;

    /// Get the reminder settings of a group. Both fields are empty if nothing was saved.
    fn get_notification_setting(&self, chat_id: i64) -> DatabaseResult<NotificationSetting>;

    /// Get the settings of all groups with both time and day set, ordered by chat ID.
    fn list_active_notification_settings(&self) -> DatabaseResult<Vec<ActiveNotification>>;
}
