//! Parse the user input.
//!
//! Amounts accept both `.` and `,` as decimal separator, since users type
//! whatever their keyboard layout gives them.

use nom::{
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt, verify},
    sequence::{pair, preceded, separated_pair},
    IResult,
};

use crate::{
    error::InputError,
    types::{Amount, NotificationTime, SettingChange},
    validator::{validate_amount, validate_notification_day, validate_notification_time},
};

/// Words that clear a reminder field instead of setting it.
const CLEAR_KEYWORDS: [&str; 3] = ["off", "none", "-"];

/// Parse a positive amount with at most two decimal digits and return it in cents.
pub fn parse_amount(s: &str) -> Result<Amount, InputError> {
    let s = s.trim();
    let (_, (sign, (integer_part, fractional_part))) =
        all_consuming(pair(opt(one_of("+-")), amount_digits))(s)
            .map_err(|_| InputError::invalid_amount(s))?;

    let integer_part: i64 = integer_part
        .parse()
        .map_err(|_| InputError::invalid_amount(s))?;
    let fractional_part: i64 = match fractional_part {
        None => 0,
        Some(f) if f.len() == 1 => f.parse::<i64>().map_err(|_| InputError::invalid_amount(s))? * 10,
        Some(f) => f.parse().map_err(|_| InputError::invalid_amount(s))?,
    };

    let amount = integer_part
        .checked_mul(100)
        .and_then(|a| a.checked_add(fractional_part))
        .ok_or_else(|| InputError::invalid_amount(s))?;
    let amount = if sign == Some('-') { -amount } else { amount };

    validate_amount(amount)?;
    Ok(amount)
}

fn amount_digits(s: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(
        digit1,
        opt(preceded(
            one_of(".,"),
            verify(digit1, |f: &str| f.len() <= 2),
        )),
    )(s)
}

/// Parse a time of day in the format `HH:MM` (a single digit hour is fine too).
pub fn parse_notification_time(s: &str) -> Result<NotificationTime, InputError> {
    let s = s.trim();
    let result: IResult<&str, (&str, &str)> = all_consuming(separated_pair(
        verify(digit1, |h: &str| h.len() <= 2),
        char(':'),
        verify(digit1, |m: &str| m.len() == 2),
    ))(s);
    let (_, (hour, minute)) = result.map_err(|_| InputError::invalid_time(s))?;

    let hour = hour.parse().map_err(|_| InputError::invalid_time(s))?;
    let minute = minute.parse().map_err(|_| InputError::invalid_time(s))?;
    let time = NotificationTime::new(hour, minute);

    validate_notification_time(&time).map_err(|_| InputError::invalid_time(s))?;
    Ok(time)
}

/// Parse a day of the month (1 to 31).
pub fn parse_notification_day(s: &str) -> Result<u8, InputError> {
    let s = s.trim();
    let result: IResult<&str, &str> = all_consuming(digit1)(s);
    let (_, day) = result.map_err(|_| InputError::invalid_day(s))?;

    let day = day.parse().map_err(|_| InputError::invalid_day(s))?;
    validate_notification_day(day).map_err(|_| InputError::invalid_day(s))?;
    Ok(day)
}

pub fn parse_time_change(s: &str) -> Result<SettingChange<NotificationTime>, InputError> {
    if is_clear_keyword(s) {
        Ok(SettingChange::Clear)
    } else {
        parse_notification_time(s).map(SettingChange::Set)
    }
}

pub fn parse_day_change(s: &str) -> Result<SettingChange<u8>, InputError> {
    if is_clear_keyword(s) {
        Ok(SettingChange::Clear)
    } else {
        parse_notification_day(s).map(SettingChange::Set)
    }
}

fn is_clear_keyword(s: &str) -> bool {
    let s = s.trim().to_lowercase();
    CLEAR_KEYWORDS.contains(&s.as_str())
}
