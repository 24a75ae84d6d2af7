use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use log4rs::{
    append::rolling_file::{
        policy::compound::{
            roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
        },
        RollingFileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tokio::sync::Mutex;

mod bot_commands;
mod config;
mod context;
mod database;
mod endpoints;
mod error;
mod formatter;
mod keyboards;
mod ledger;
mod notifier;
mod parser;
mod scheduler;
mod types;
mod validator;

use crate::bot_commands::{dialogue_handler, State};
use crate::config::Config;
use crate::context::AppContext;
use crate::database::sqlite::SqliteDatabase;
use crate::notifier::reminder_callback;
use crate::scheduler::ReminderScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_log(&config)?;

    info!("Initializing database...");
    let database = SqliteDatabase::new(&config.database_path)
        .map_err(|e| {
            error!("Cannot initialize database: {}", e);
            e
        })
        .context("cannot initialize database")?;
    let database = Arc::new(Mutex::new(database));

    let bot = Bot::from_env();

    info!("Scheduling reminders...");
    let scheduler = Arc::new(ReminderScheduler::new(reminder_callback(
        bot.clone(),
        database.clone(),
    )));
    let active = scheduler
        .resync(&database)
        .await
        .context("cannot schedule reminders")?;
    info!("{active} reminders scheduled");

    let context = AppContext::new(database, scheduler, config);

    info!("Starting command bot...");

    Dispatcher::builder(bot, dialogue_handler())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), context])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
    Ok(())
}

fn init_log(config: &Config) -> anyhow::Result<()> {
    // Create a trigger that rolls the log file when it exceeds 10 MB.
    let size_trigger = SizeTrigger::new(10 * 1024 * 1024);

    // Create a roller that keeps up to 2 backup log files with a pattern.
    let pattern = config.log_file_pattern();
    let fixed_window_roller = FixedWindowRoller::builder()
        .build(&pattern.to_string_lossy(), 2)
        .context("[init log] Cannot create fixed window roller")?;

    // Combine trigger and roller into a compound policy.
    let compound_policy =
        CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

    // Create a rolling file appender.
    let rolling_file_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} - {l} - {m}{n}")))
        .build(config.log_file(), Box::new(compound_policy))
        .context("[init log] Cannot create rolling file appender")?;

    // Create the configuration.
    let log_config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("rolling_file", Box::new(rolling_file_appender)))
        .build(
            Root::builder()
                .appender("rolling_file")
                .build(config.log_level),
        )
        .context("[init log] Cannot build config")?;

    // Initialize log4rs with the configuration
    log4rs::init_config(log_config).context("[init log] Cannot init log4rs")?;
    Ok(())
}
