//! Produce the strings that are sent as bot messages.
//! Everything returned by this module is MarkdownV2, so user-provided
//! text (names, titles) is always escaped.

use chrono::{DateTime, Local};
use teloxide::utils::markdown::{bold, escape};

use crate::types::{Amount, Group, HistoryEntry, NotificationSetting, TransactionKind};

/// Telegram refuses messages longer than this.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let amount = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, amount / 100, amount % 100)
}

pub fn format_balance(balance: Amount) -> String {
    format!(
        "💰  Current group balance: {}",
        bold(&escape(&format_amount(balance)))
    )
}

pub fn format_transaction_committed(
    kind: TransactionKind,
    amount: Amount,
    actor_name: &str,
    balance: Amount,
) -> String {
    let (what, who) = match kind {
        TransactionKind::Deposit => ("Deposit", "Paid by"),
        TransactionKind::Withdrawal => ("Withdrawal", "Withdrawn by"),
    };
    format!(
        "✅  {} of {} recorded\\!\n👤  {}: {}\n{}",
        what,
        bold(&escape(&format_amount(amount))),
        who,
        escape(actor_name),
        format_balance(balance)
    )
}

pub fn format_confirmation_request(kind: TransactionKind, amount: Amount) -> String {
    let what = match kind {
        TransactionKind::Deposit => "deposit",
        TransactionKind::Withdrawal => "withdrawal",
    };
    format!(
        "Please confirm the {} of {}",
        what,
        bold(&escape(&format_amount(amount)))
    )
}

pub fn format_insufficient_funds(available: Amount) -> String {
    format!(
        "❌  Insufficient funds\\. Available: {}",
        bold(&escape(&format_amount(available)))
    )
}

/// Format the history and split it so that every chunk fits in a single message.
pub fn format_history(entries: &[HistoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![escape("📝  The transaction history is empty")];
    }

    let mut lines = vec![escape("📝  Latest transactions:"), String::new()];
    lines.extend(entries.iter().map(format_history_entry));
    split_message(&lines, MAX_MESSAGE_LENGTH)
}

fn format_history_entry(entry: &HistoryEntry) -> String {
    let timestamp = entry
        .created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let operation = match entry.kind {
        TransactionKind::Deposit => "➕  Deposit",
        TransactionKind::Withdrawal => "➖  Withdrawal",
    };
    let actor = match &entry.actor_name {
        Some(name) => format!(" by {}", name),
        None => String::new(),
    };
    format!(
        "{}: {}{} of {}",
        escape(&timestamp),
        escape(operation),
        escape(&actor),
        bold(&escape(&format_amount(entry.amount)))
    )
}

/// Join lines into messages no longer than *max_length* characters, never
/// breaking a line (so that no escape sequence is cut in half). A single line
/// longer than the limit is split by characters as a last resort.
pub fn split_message<T: AsRef<str>>(lines: &[T], max_length: usize) -> Vec<String> {
    let mut chunks = vec![];
    let mut current = String::new();
    let mut current_length = 0;

    for line in lines {
        let line = line.as_ref();
        let line_length = line.chars().count();

        if current_length > 0 && current_length + line_length + 1 > max_length {
            chunks.push(std::mem::take(&mut current));
            current_length = 0;
        }

        if line_length > max_length {
            let chars: Vec<_> = line.chars().collect();
            for piece in chars.chunks(max_length) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if current_length > 0 {
            current.push('\n');
            current_length += 1;
        }
        current.push_str(line);
        current_length += line_length;
    }

    if current_length > 0 {
        chunks.push(current);
    }
    chunks
}

pub fn format_settings(setting: &NotificationSetting) -> String {
    let mut result = escape("⚙️  Current reminder settings:");
    result.push_str("\n\n");

    match setting.schedule() {
        Some(schedule) => {
            result.push_str(&format!(
                "🕒  Time: {}\n📅  Day: {}",
                bold(&escape(&schedule.time.to_string())),
                bold(&schedule.day.to_string())
            ));
        }
        None => {
            let time = setting
                .time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "not set".to_string());
            let day = setting
                .day
                .map(|d| d.to_string())
                .unwrap_or_else(|| "not set".to_string());
            result.push_str(&escape(&format!(
                "Reminders are not active (time: {time}, day: {day})"
            )));
        }
    }

    result.push_str("\n\n");
    result.push_str(&escape("Choose what to configure:"));
    result
}

pub fn format_welcome(title: Option<&str>) -> String {
    let greeting = match title {
        Some(title) => format!("👋  Hello, {}\\!", bold(&escape(title))),
        None => escape("👋  Hello!"),
    };
    format!(
        "{}\n{}",
        greeting,
        escape("I keep track of the group kitty. Use the buttons below or /help.")
    )
}

pub fn format_cancelled() -> String {
    escape("❌  Operation cancelled.")
}

pub fn format_expired() -> String {
    escape("⌛  The confirmation expired, nothing was recorded. Please start again.")
}

pub fn format_reminder(balance: Amount) -> String {
    format!(
        "🔔  {}\n{}",
        escape("Reminder: time to pay into the group kitty!"),
        format_balance(balance)
    )
}

pub fn format_status(
    group: Option<&Group>,
    transaction_count: usize,
    next_reminder: Option<DateTime<Local>>,
    bot_is_admin: bool,
) -> String {
    let registration = match group {
        Some(group) => format!(
            "registered since {}",
            group.joined_at.with_timezone(&Local).format("%Y-%m-%d")
        ),
        None => "not registered, use /start".to_string(),
    };
    let reminder = match next_reminder {
        Some(next) => format!("next on {}", next.format("%Y-%m-%d %H:%M")),
        None => "not active".to_string(),
    };
    let rights = if bot_is_admin { "administrator" } else { "member" };
    escape(&format!(
        "📊  Bot status:\n\n✅  Bot is running\n✅  Database is reachable\n\
         🏠  Group: {registration}\n📝  Transactions: {transaction_count}\n\
         🔔  Monthly reminder: {reminder}\n👤  Bot rights: {rights}"
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::types::NotificationTime;

    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(10050), "100.50");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(-4000), "-40.00");
    }

    #[test]
    fn test_format_balance() {
        assert_eq!(
            format_balance(6000),
            "💰  Current group balance: *60\\.00*"
        );
    }

    #[test]
    fn test_format_history_entry() {
        let entry = HistoryEntry {
            id: 1,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            kind: TransactionKind::Deposit,
            amount: 10050,
            actor_name: Some("Anna K.".to_string()),
        };
        let result = format_history_entry(&entry);
        assert!(result.ends_with(": ➕  Deposit by Anna K\\. of *100\\.50*"));

        let entry = HistoryEntry {
            actor_name: None,
            kind: TransactionKind::Withdrawal,
            ..entry
        };
        let result = format_history_entry(&entry);
        assert!(result.ends_with(": ➖  Withdrawal of *100\\.50*"));
    }

    #[test]
    fn test_format_empty_history() {
        let result = format_history(&[]);
        assert_eq!(result.len(), 1);
        assert!(result[0].contains("empty"));
    }

    #[test]
    fn test_split_message() {
        let lines = vec!["aaaa", "bbbb", "cccc"];
        assert_eq!(split_message(&lines, 9), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(split_message(&lines, 100), vec!["aaaa\nbbbb\ncccc"]);

        let lines = vec!["abcdefg"];
        assert_eq!(split_message(&lines, 3), vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_long_history_is_split() {
        let entry = HistoryEntry {
            id: 1,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            kind: TransactionKind::Deposit,
            amount: 10050,
            actor_name: Some("x".repeat(100)),
        };
        let entries = vec![entry; 50];
        let chunks = format_history(&entries);
        assert!(chunks.len() > 1);
        for chunk in chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_LENGTH);
        }
    }

    #[test]
    fn test_format_welcome_escapes_title() {
        let result = format_welcome(Some("Flat 3.B"));
        assert!(result.starts_with("👋  Hello, *Flat 3\\.B*\\!"));
        assert!(format_welcome(None).starts_with("👋  Hello\\!"));
    }

    #[test]
    fn test_format_status() {
        let group = Group {
            chat_id: 1,
            title: Some("Flat 3B".to_string()),
            joined_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        };
        let next = Local
            .with_ymd_and_hms(2024, 4, 15, 10, 0, 0)
            .earliest()
            .expect("test");

        let result = format_status(Some(&group), 3, Some(next), true);
        let joined = group.joined_at.with_timezone(&Local).format("%Y-%m-%d");
        assert!(result.contains(&escape(&format!("Group: registered since {joined}"))));
        assert!(result.contains("Transactions: 3"));
        assert!(result.contains("Monthly reminder: next on 2024\\-04\\-15 10:00"));
        assert!(result.contains("Bot rights: administrator"));

        let result = format_status(None, 0, None, false);
        assert!(result.contains("Group: not registered, use /start"));
        assert!(result.contains("Monthly reminder: not active"));
        assert!(result.contains("Bot rights: member"));
    }

    #[test]
    fn test_format_settings() {
        let setting = NotificationSetting::new(Some(NotificationTime::new(10, 0)), Some(15));
        let result = format_settings(&setting);
        assert!(result.contains("Time: *10:00*"));
        assert!(result.contains("Day: *15*"));

        let setting = NotificationSetting::new(None, Some(15));
        let result = format_settings(&setting);
        assert!(result.contains("Reminders are not active \\(time: not set, day: 15\\)"));
    }
}
