use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};

/// Money is kept as an integer number of cents.
pub type Amount = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

/// The member who recorded a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub chat_id: i64,
    pub title: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// A transaction that is about to be appended to the log.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub actor: Option<Actor>,
}

/// A transaction that was appended to the log, with the balance right after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedTransaction {
    pub id: i64,
    pub balance: Amount,
}

/// A transaction as it is returned by the history view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub actor_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NotificationTime {
    pub hour: u8,
    pub minute: u8,
}

/// When a reminder fires: once a month, on `day` at `time`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthlySchedule {
    pub day: u8,
    pub time: NotificationTime,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotificationSetting {
    pub time: Option<NotificationTime>,
    pub day: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveNotification {
    pub chat_id: i64,
    pub schedule: MonthlySchedule,
}

/// How a single settings field changes on upsert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingChange<T> {
    Unchanged,
    Set(T),
    Clear,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }

    pub fn from_name(s: &str) -> Option<TransactionKind> {
        match s {
            "deposit" => Some(TransactionKind::Deposit),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            _ => None,
        }
    }
}

impl Actor {
    pub fn new(id: i64, name: &str) -> Actor {
        Actor {
            id,
            name: name.to_string(),
        }
    }
}

impl NewTransaction {
    pub fn deposit(amount: Amount, actor: Option<Actor>) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Deposit,
            amount,
            actor,
        }
    }

    pub fn withdrawal(amount: Amount, actor: Option<Actor>) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Withdrawal,
            amount,
            actor,
        }
    }
}

impl NotificationTime {
    pub fn new(hour: u8, minute: u8) -> NotificationTime {
        NotificationTime { hour, minute }
    }

    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
    }
}

impl fmt::Display for NotificationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl MonthlySchedule {
    pub fn new(day: u8, time: NotificationTime) -> MonthlySchedule {
        MonthlySchedule { day, time }
    }
}

impl NotificationSetting {
    pub fn new(time: Option<NotificationTime>, day: Option<u8>) -> NotificationSetting {
        NotificationSetting { time, day }
    }

    /// A reminder is only active once both fields are set.
    pub fn schedule(&self) -> Option<MonthlySchedule> {
        match (self.time, self.day) {
            (Some(time), Some(day)) => Some(MonthlySchedule::new(day, time)),
            _ => None,
        }
    }
}

impl<T> SettingChange<T> {
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            SettingChange::Unchanged => current,
            SettingChange::Set(value) => Some(value),
            SettingChange::Clear => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_change_apply() {
        assert_eq!(SettingChange::Unchanged.apply(Some(3)), Some(3));
        assert_eq!(SettingChange::<u8>::Unchanged.apply(None), None);
        assert_eq!(SettingChange::Set(5).apply(Some(3)), Some(5));
        assert_eq!(SettingChange::Clear.apply(Some(3)), None);
    }

    #[test]
    fn test_schedule_requires_both_fields() {
        let time = NotificationTime::new(10, 0);
        assert_eq!(NotificationSetting::new(Some(time), None).schedule(), None);
        assert_eq!(NotificationSetting::new(None, Some(15)).schedule(), None);
        assert_eq!(
            NotificationSetting::new(Some(time), Some(15)).schedule(),
            Some(MonthlySchedule::new(15, time))
        );
    }

    #[test]
    fn test_notification_time_display() {
        assert_eq!(NotificationTime::new(9, 5).to_string(), "09:05");
        assert_eq!(NotificationTime::new(23, 59).to_string(), "23:59");
    }
}
