use teloxide::RequestError;
use thiserror::Error;

use crate::formatter::format_amount;
use crate::types::Amount;
use crate::validator::MAX_AMOUNT;

/// Error returned to a chat handler. It carries the message we log and the
/// (possibly different) message we show to the user.
#[derive(Error)]
#[error("An error occurred: {user_message}")]
pub struct BotError {
    message: String,
    user_message: String,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("invalid amount `{0}`: use a number such as 100 or 100.50")]
    InvalidAmount(String),

    #[error("the amount must be positive")]
    NonPositiveAmount,

    #[error("the amount is too large: the maximum is {}", format_amount(MAX_AMOUNT))]
    AmountTooLarge,

    #[error("invalid time `{0}`: use the format HH:MM, for example 10:00")]
    InvalidTime(String),

    #[error("invalid day `{0}`: use a number from 1 to 31")]
    InvalidDay(String),

    #[error("this bot only works in group chats")]
    NotAGroup,

    #[error("only group administrators can do this")]
    NotAnAdmin,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("{message}: {cause}")]
    Storage {
        message: String,
        cause: anyhow::Error,
    },

    #[error(transparent)]
    Input(#[from] InputError),
}

/// Outcome of a rejected ledger or settings operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Input(InputError),

    #[error("insufficient funds: the available balance is {}", format_amount(*.available))]
    InsufficientFunds { available: Amount },

    #[error(transparent)]
    Database(DatabaseError),
}

/// A message (usually a reminder) could not be delivered to a chat.
#[derive(Error, Debug)]
#[error("cannot deliver message to chat {chat_id}: {source}")]
pub struct DeliveryError {
    chat_id: i64,
    #[source]
    source: RequestError,
}

impl InputError {
    pub fn invalid_amount<T: AsRef<str>>(amount: T) -> Self {
        InputError::InvalidAmount(amount.as_ref().to_string())
    }

    pub fn non_positive_amount() -> Self {
        InputError::NonPositiveAmount
    }

    pub fn amount_too_large() -> Self {
        InputError::AmountTooLarge
    }

    pub fn invalid_time<T: AsRef<str>>(time: T) -> Self {
        InputError::InvalidTime(time.as_ref().to_string())
    }

    pub fn invalid_day<T: AsRef<str>>(day: T) -> Self {
        InputError::InvalidDay(day.as_ref().to_string())
    }

    pub fn not_a_group() -> Self {
        InputError::NotAGroup
    }

    pub fn not_an_admin() -> Self {
        InputError::NotAnAdmin
    }
}

impl DatabaseError {
    pub fn new<T: AsRef<str>>(message: T, cause: anyhow::Error) -> Self {
        DatabaseError::Storage {
            message: message.as_ref().to_string(),
            cause,
        }
    }
}

impl LedgerError {
    pub fn insufficient_funds(available: Amount) -> Self {
        LedgerError::InsufficientFunds { available }
    }
}

impl From<InputError> for LedgerError {
    fn from(e: InputError) -> Self {
        LedgerError::Input(e)
    }
}

impl From<DatabaseError> for LedgerError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Input(e) => LedgerError::Input(e),
            e => LedgerError::Database(e),
        }
    }
}

impl DeliveryError {
    pub fn new(chat_id: i64, source: RequestError) -> Self {
        DeliveryError { chat_id, source }
    }
}

impl BotError {
    pub fn new(message: String, user_message: String) -> Self {
        BotError {
            message,
            user_message,
        }
    }

    pub fn database(message: &str, e: DatabaseError) -> Self {
        let message = format!("{message}: {e}");
        let user_message = "cannot query the database, please try again later".to_string();
        BotError {
            message,
            user_message,
        }
    }

    pub fn telegram(message: &str, e: RequestError) -> Self {
        let message = format!("{message}: {e}");
        let user_message =
            "cannot communicate with Telegram server, please try again later".to_string();
        BotError {
            message,
            user_message,
        }
    }

    #[cfg(test)]
    pub fn user_message(&self) -> &str {
        &self.user_message
    }
}

impl From<InputError> for BotError {
    fn from(e: InputError) -> Self {
        let user_message = e.to_string();
        BotError {
            message: user_message.clone(),
            user_message,
        }
    }
}

impl From<LedgerError> for BotError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Input(e) => e.into(),
            LedgerError::Database(e) => BotError::database("ledger operation failed", e),
            e => {
                let user_message = e.to_string();
                BotError {
                    message: user_message.clone(),
                    user_message,
                }
            }
        }
    }
}

impl std::fmt::Debug for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_input_error_becomes_ledger_input_error() {
        let e: LedgerError = DatabaseError::from(InputError::non_positive_amount()).into();
        assert!(matches!(e, LedgerError::Input(InputError::NonPositiveAmount)));

        let e: LedgerError = DatabaseError::new("cannot write", anyhow::anyhow!("disk full")).into();
        assert!(matches!(e, LedgerError::Database(_)));
    }

    #[test]
    fn test_bot_error_messages() {
        let e: BotError = LedgerError::insufficient_funds(4050).into();
        assert_eq!(
            e.user_message(),
            "insufficient funds: the available balance is 40.50"
        );

        let e: BotError =
            LedgerError::Database(DatabaseError::new("cannot write", anyhow::anyhow!("locked")))
                .into();
        assert_eq!(
            e.user_message(),
            "cannot query the database, please try again later"
        );
        assert_eq!(
            format!("{e:?}"),
            "ledger operation failed: cannot write: locked"
        );
    }
}
