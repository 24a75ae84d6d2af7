const CREATE_GROUP_TABLE: &str = "CREATE TABLE IF NOT EXISTS chat_group (
  chat_id INTEGER PRIMARY KEY,
  title TEXT,
  joined_at DATETIME NOT NULL
)";

const CREATE_TRANSACTION_TABLE: &str = "CREATE TABLE IF NOT EXISTS ledger_transaction (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  chat_id INTEGER NOT NULL REFERENCES chat_group(chat_id),
  actor_id INTEGER,
  actor_name TEXT,
  amount INTEGER NOT NULL CHECK(amount > 0),
  kind TEXT NOT NULL CHECK(kind IN ('deposit', 'withdrawal')),
  created_at DATETIME NOT NULL
)";

const CREATE_TRANSACTION_INDEX: &str = "CREATE INDEX IF NOT EXISTS ledger_transaction_chat_idx
  ON ledger_transaction (chat_id, created_at)";

const CREATE_NOTIFICATION_SETTING_TABLE: &str = "CREATE TABLE IF NOT EXISTS notification_setting (
  chat_id INTEGER PRIMARY KEY,
  notification_time TEXT,
  notification_day INTEGER CHECK(notification_day BETWEEN 1 AND 31)
)";

pub fn create_all_tables(connection: &rusqlite::Connection) -> anyhow::Result<()> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute(CREATE_GROUP_TABLE, ())?;
    connection.execute(CREATE_TRANSACTION_TABLE, ())?;
    connection.execute(CREATE_TRANSACTION_INDEX, ())?;
    connection.execute(CREATE_NOTIFICATION_SETTING_TABLE, ())?;
    Ok(())
}
