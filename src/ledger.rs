//! Deposits and withdrawals, with an optional confirmation step.
//!
//! Every function takes the store lock once and keeps it until the write is
//! done: for withdrawals this is what keeps the balance from going negative
//! when two members withdraw at the same time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use tokio::sync::Mutex;

use crate::{
    database::Database,
    error::LedgerError,
    parser::parse_amount,
    types::{Actor, Amount, NewTransaction, TransactionKind},
    validator::validate_amount,
};

/// Amount that was typed by a member and is waiting for confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub chat_id: i64,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub actor: Actor,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Committed { amount: Amount, balance: Amount },
    Discarded,
    Expired,
}

impl PendingTransaction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Record a deposit and return the new balance.
pub async fn deposit<D: Database>(
    chat_id: i64,
    amount: Amount,
    actor: Option<Actor>,
    now: DateTime<Utc>,
    database: &Arc<Mutex<D>>,
) -> Result<Amount, LedgerError> {
    validate_amount(amount)?;

    let recorded = database.lock().await.record_transaction(
        chat_id,
        &NewTransaction::deposit(amount, actor),
        now,
    )?;
    Ok(recorded.balance)
}

/// Record a withdrawal and return the new balance.
///
/// Fails without writing anything if the amount exceeds the current balance.
pub async fn withdraw<D: Database>(
    chat_id: i64,
    amount: Amount,
    actor: Option<Actor>,
    now: DateTime<Utc>,
    database: &Arc<Mutex<D>>,
) -> Result<Amount, LedgerError> {
    validate_amount(amount)?;

    let mut database = database.lock().await;
    let available = database.get_balance(chat_id)?;
    if amount > available {
        info!("Withdrawal refused. Chat ID: {chat_id}. Amount: {amount}. Available: {available}");
        return Err(LedgerError::insufficient_funds(available));
    }

    let recorded =
        database.record_transaction(chat_id, &NewTransaction::withdrawal(amount, actor), now)?;
    Ok(recorded.balance)
}

/// Parse the amount typed by a member and turn it into a pending transaction.
///
/// Withdrawals are checked against the balance already here, so that the
/// member does not have to confirm something that is going to fail. The
/// check is repeated when the transaction is confirmed.
pub async fn prepare<D: Database>(
    kind: TransactionKind,
    text: &str,
    chat_id: i64,
    actor: Actor,
    now: DateTime<Utc>,
    timeout: Duration,
    database: &Arc<Mutex<D>>,
) -> Result<PendingTransaction, LedgerError> {
    let amount = parse_amount(text)?;

    if kind == TransactionKind::Withdrawal {
        let available = database.lock().await.get_balance(chat_id)?;
        if amount > available {
            return Err(LedgerError::insufficient_funds(available));
        }
    }

    debug!("Pending {}. Chat ID: {chat_id}. Amount: {amount}", kind.as_str());
    Ok(PendingTransaction {
        chat_id,
        kind,
        amount,
        actor,
        expires_at: now + timeout,
    })
}

/// Commit or drop a pending transaction.
///
/// Nothing is written if the member declined or the confirmation came too late.
/// The expiry is checked against `answered_at` (when the member replied), while
/// the transaction is recorded with `committed_at`.
pub async fn confirm<D: Database>(
    pending: PendingTransaction,
    affirmative: bool,
    answered_at: DateTime<Utc>,
    committed_at: DateTime<Utc>,
    database: &Arc<Mutex<D>>,
) -> Result<ConfirmOutcome, LedgerError> {
    if !affirmative {
        debug!("Pending transaction discarded. Chat ID: {}", pending.chat_id);
        return Ok(ConfirmOutcome::Discarded);
    }
    if pending.is_expired(answered_at) {
        debug!("Pending transaction expired. Chat ID: {}", pending.chat_id);
        return Ok(ConfirmOutcome::Expired);
    }

    let PendingTransaction {
        chat_id,
        kind,
        amount,
        actor,
        ..
    } = pending;
    let balance = match kind {
        TransactionKind::Deposit => {
            deposit(chat_id, amount, Some(actor), committed_at, database).await?
        }
        TransactionKind::Withdrawal => {
            withdraw(chat_id, amount, Some(actor), committed_at, database).await?
        }
    };

    Ok(ConfirmOutcome::Committed { amount, balance })
}
