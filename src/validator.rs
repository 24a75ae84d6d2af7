//! Functions that check the validity of user input.
//!
//! These functions are called after the parsing phase and execute
//! checks that are not easily done by the parser. The database runs
//! [`validate_amount`] again before writing.

use crate::{
    error::InputError,
    types::{Amount, NotificationTime},
};

/// Largest amount of a single transaction, in cents.
///
/// Keeps the sum of a group's log far away from the range of `i64`.
pub const MAX_AMOUNT: Amount = 10_000_000_000_000;

pub fn validate_amount(amount: Amount) -> Result<(), InputError> {
    if amount <= 0 {
        Err(InputError::non_positive_amount())
    } else if amount > MAX_AMOUNT {
        Err(InputError::amount_too_large())
    } else {
        Ok(())
    }
}

pub fn validate_notification_time(time: &NotificationTime) -> Result<(), InputError> {
    if time.hour <= 23 && time.minute <= 59 {
        Ok(())
    } else {
        Err(InputError::invalid_time(time.to_string()))
    }
}

pub fn validate_notification_day(day: u8) -> Result<(), InputError> {
    if (1..=31).contains(&day) {
        Ok(())
    } else {
        Err(InputError::invalid_day(day.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-100).is_err());
        assert!(validate_amount(MAX_AMOUNT).is_ok());
        assert!(matches!(
            validate_amount(MAX_AMOUNT + 1),
            Err(InputError::AmountTooLarge)
        ));
    }

    #[test]
    fn test_validate_notification_time() {
        assert!(validate_notification_time(&NotificationTime::new(0, 0)).is_ok());
        assert!(validate_notification_time(&NotificationTime::new(23, 59)).is_ok());
        assert!(validate_notification_time(&NotificationTime::new(24, 0)).is_err());
        assert!(validate_notification_time(&NotificationTime::new(12, 60)).is_err());
    }

    #[test]
    fn test_validate_notification_day() {
        assert!(validate_notification_day(1).is_ok());
        assert!(validate_notification_day(31).is_ok());
        assert!(validate_notification_day(0).is_err());
        assert!(validate_notification_day(32).is_err());
    }
}
