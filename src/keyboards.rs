//! Reply keyboards and the texts of their buttons.

use teloxide::types::{KeyboardButton, KeyboardMarkup};

pub const PAY_BUTTON: &str = "💰 I paid";
pub const WITHDRAW_BUTTON: &str = "💸 Withdraw";
pub const BALANCE_BUTTON: &str = "📊 Balance";
pub const HISTORY_BUTTON: &str = "📝 History";
pub const SETTINGS_BUTTON: &str = "⚙️ Settings";
pub const REMINDER_TIME_BUTTON: &str = "⏰ Reminder time";
pub const REMINDER_DAY_BUTTON: &str = "📅 Reminder day";
pub const MENU_BUTTON: &str = "↩️ Back to menu";
pub const CANCEL_BUTTON: &str = "❌ Cancel";
pub const CONFIRM_BUTTON: &str = "✅ Confirm";

fn keyboard(rows: &[&[&str]]) -> KeyboardMarkup {
    let rows = rows
        .iter()
        .map(|row| row.iter().map(|text| KeyboardButton::new(*text)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

pub fn main_keyboard() -> KeyboardMarkup {
    keyboard(&[
        &[PAY_BUTTON, WITHDRAW_BUTTON],
        &[BALANCE_BUTTON, HISTORY_BUTTON],
        &[SETTINGS_BUTTON],
    ])
}

pub fn cancel_keyboard() -> KeyboardMarkup {
    keyboard(&[&[CANCEL_BUTTON]])
}

pub fn confirm_keyboard() -> KeyboardMarkup {
    keyboard(&[&[CONFIRM_BUTTON, CANCEL_BUTTON]])
}

pub fn settings_keyboard() -> KeyboardMarkup {
    keyboard(&[&[REMINDER_TIME_BUTTON, REMINDER_DAY_BUTTON], &[MENU_BUTTON]])
}
