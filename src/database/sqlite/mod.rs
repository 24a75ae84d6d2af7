//! The implementation of a data storage using Sqlite.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, ToSql,
};
use tokio::task::block_in_place;

use crate::{
    error::DatabaseError,
    parser::parse_notification_time,
    types::{
        ActiveNotification, Amount, Group, HistoryEntry, MonthlySchedule, NewTransaction,
        NotificationSetting, NotificationTime, RecordedTransaction, SettingChange,
        TransactionKind,
    },
    validator::{validate_amount, validate_notification_day, validate_notification_time},
};

use super::{Database, DatabaseResult};

mod schema;

const BALANCE_QUERY: &str =
    "SELECT COALESCE(SUM(CASE WHEN kind = 'deposit' THEN amount ELSE -amount END), 0)
     FROM ledger_transaction WHERE chat_id = ?1";

pub struct SqliteDatabase {
    connection: Connection,
}

impl SqliteDatabase {
    /// Open (or create) the database file and make sure that all tables exist.
    pub fn new<P: AsRef<Path>>(path: P) -> DatabaseResult<SqliteDatabase> {
        block_in_place(|| {
            let connection = Connection::open(path.as_ref())
                .map_err(|e| DatabaseError::new("cannot open database", e.into()))?;
            schema::create_all_tables(&connection)
                .map_err(|e| DatabaseError::new("cannot create tables", e))?;
            Ok(SqliteDatabase { connection })
        })
    }
}

impl Database for SqliteDatabase {
    fn upsert_group(
        &mut self,
        chat_id: i64,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        debug!("Upserting group. Chat ID: {chat_id}. Title: {title:?}");
        let fn_impl = || -> anyhow::Result<()> {
            self.connection.execute(
                "INSERT INTO chat_group (chat_id, title, joined_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET title = COALESCE(excluded.title, title)",
                params![&chat_id, &title, &now],
            )?;

            Ok(())
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot upsert group", e)))
    }

    fn get_group(&self, chat_id: i64) -> DatabaseResult<Option<Group>> {
        let fn_impl = || -> anyhow::Result<Option<Group>> {
            let group = self
                .connection
                .query_row(
                    "SELECT chat_id, title, joined_at FROM chat_group WHERE chat_id = ?1",
                    params![&chat_id],
                    |row| {
                        Ok(Group {
                            chat_id: row.get(0)?,
                            title: row.get(1)?,
                            joined_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;

            Ok(group)
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot get group", e)))
    }

    fn record_transaction(
        &mut self,
        chat_id: i64,
        transaction: &NewTransaction,
        now: DateTime<Utc>,
    ) -> DatabaseResult<RecordedTransaction> {
        validate_amount(transaction.amount)?;

        let mut fn_impl = || -> anyhow::Result<RecordedTransaction> {
            let tx = self.connection.transaction()?;

            let new_groups = tx.execute(
                "INSERT OR IGNORE INTO chat_group (chat_id, joined_at) VALUES (?1, ?2)",
                params![&chat_id, &now],
            )?;
            if new_groups > 0 {
                info!("Group {chat_id} was created while recording a transaction");
            }

            let actor_id = transaction.actor.as_ref().map(|a| a.id);
            let actor_name = transaction.actor.as_ref().map(|a| a.name.as_str());

            let transaction_id: i64 = {
                let mut insert_transaction_stmt = tx.prepare_cached(
                    "INSERT INTO ledger_transaction (chat_id, actor_id, actor_name, amount, kind, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                )?;

                insert_transaction_stmt.query_row(
                    params![
                        &chat_id,
                        &actor_id,
                        &actor_name,
                        &transaction.amount,
                        &transaction.kind,
                        &now
                    ],
                    |row| row.get(0),
                )?
            };

            let balance = query_balance(&tx, chat_id)?;

            tx.commit()?;

            Ok(RecordedTransaction {
                id: transaction_id,
                balance,
            })
        };

        let recorded =
            block_in_place(|| fn_impl().map_err(|e| map_error("cannot record transaction", e)))?;
        info!(
            "Transaction saved. Chat ID: {chat_id}. ID: {}. Kind: {}. Amount: {}. Balance: {}",
            recorded.id,
            transaction.kind.as_str(),
            transaction.amount,
            recorded.balance
        );
        Ok(recorded)
    }

    fn get_balance(&self, chat_id: i64) -> DatabaseResult<Amount> {
        let fn_impl = || -> anyhow::Result<Amount> {
            let balance = query_balance(&self.connection, chat_id)?;
            Ok(balance)
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot get balance", e)))
    }

    fn get_history(&self, chat_id: i64, limit: usize) -> DatabaseResult<Vec<HistoryEntry>> {
        let fn_impl = || -> anyhow::Result<Vec<HistoryEntry>> {
            let mut stmt = self.connection.prepare_cached(
                "SELECT id, created_at, kind, amount, actor_name FROM ledger_transaction
                 WHERE chat_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let history_iter = stmt.query_map(params![&chat_id, &limit], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    kind: row.get(2)?,
                    amount: row.get(3)?,
                    actor_name: row.get(4)?,
                })
            })?;

            let history = history_iter.collect::<Result<_, _>>()?;
            Ok(history)
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot get history", e)))
    }

    fn count_transactions(&self, chat_id: i64) -> DatabaseResult<usize> {
        let fn_impl = || -> anyhow::Result<usize> {
            let count: i64 = self.connection.query_row(
                "SELECT COUNT(*) FROM ledger_transaction WHERE chat_id = ?1",
                params![&chat_id],
                |row| row.get(0),
            )?;

            Ok(usize::try_from(count)?)
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot count transactions", e)))
    }

    fn upsert_notification_setting(
        &mut self,
        chat_id: i64,
        time: SettingChange<NotificationTime>,
        day: SettingChange<u8>,
    ) -> DatabaseResult<NotificationSetting> {
        if let SettingChange::Set(time) = &time {
            validate_notification_time(time)?;
        }
        if let SettingChange::Set(day) = day {
            validate_notification_day(day)?;
        }

        let mut fn_impl = || -> anyhow::Result<NotificationSetting> {
            let tx = self.connection.transaction()?;

            let current = tx
                .query_row(
                    "SELECT notification_time, notification_day FROM notification_setting
                     WHERE chat_id = ?1",
                    params![&chat_id],
                    |row| Ok(NotificationSetting::new(row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .unwrap_or_default();

            let updated = NotificationSetting::new(time.apply(current.time), day.apply(current.day));

            tx.execute(
                "INSERT INTO notification_setting (chat_id, notification_time, notification_day)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     notification_time = excluded.notification_time,
                     notification_day = excluded.notification_day",
                params![&chat_id, &updated.time, &updated.day],
            )?;

            tx.commit()?;

            Ok(updated)
        };

        let updated = block_in_place(|| {
            fn_impl().map_err(|e| map_error("cannot save notification settings", e))
        })?;
        info!("Notification settings saved. Chat ID: {chat_id}. Settings: {updated:?}");
        Ok(updated)
    }

    fn get_notification_setting(&self, chat_id: i64) -> DatabaseResult<NotificationSetting> {
        let fn_impl = || -> anyhow::Result<NotificationSetting> {
            let setting = self
                .connection
                .query_row(
                    "SELECT notification_time, notification_day FROM notification_setting
                     WHERE chat_id = ?1",
                    params![&chat_id],
                    |row| Ok(NotificationSetting::new(row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            Ok(setting.unwrap_or_default())
        };

        block_in_place(|| fn_impl().map_err(|e| map_error("cannot get notification settings", e)))
    }

    fn list_active_notification_settings(&self) -> DatabaseResult<Vec<ActiveNotification>> {
        let fn_impl = || -> anyhow::Result<Vec<ActiveNotification>> {
            let mut stmt = self.connection.prepare_cached(
                "SELECT chat_id, notification_time, notification_day FROM notification_setting
                 WHERE notification_time IS NOT NULL AND notification_day IS NOT NULL
                 ORDER BY chat_id",
            )?;

            let setting_iter = stmt.query_map([], |row| {
                Ok(ActiveNotification {
                    chat_id: row.get(0)?,
                    schedule: MonthlySchedule::new(row.get(2)?, row.get(1)?),
                })
            })?;

            let settings = setting_iter.collect::<Result<_, _>>()?;
            Ok(settings)
        };

        block_in_place(|| {
            fn_impl().map_err(|e| map_error("cannot list active notification settings", e))
        })
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let kind = value.as_str()?;
        TransactionKind::from_name(kind)
            .ok_or_else(|| FromSqlError::Other(format!("unknown transaction kind `{kind}`").into()))
    }
}

/// Times are stored as `HH:MM` text.
impl ToSql for NotificationTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for NotificationTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_notification_time(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn query_balance(connection: &Connection, chat_id: i64) -> rusqlite::Result<Amount> {
    let mut stmt = connection.prepare_cached(BALANCE_QUERY)?;
    stmt.query_row(params![&chat_id], |row| row.get(0))
}

fn map_error<T: AsRef<str>>(message: T, e: anyhow::Error) -> DatabaseError {
    match e.downcast::<DatabaseError>() {
        Ok(e) => e,
        Err(e) => DatabaseError::new(message, e),
    }
}
