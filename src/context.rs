use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{config::Config, scheduler::ReminderScheduler};

/// Everything a handler needs, built once at startup and shared by all updates.
pub struct AppContext<D> {
    pub database: Arc<Mutex<D>>,
    pub scheduler: Arc<ReminderScheduler>,
    pub config: Arc<Config>,
}

impl<D> AppContext<D> {
    pub fn new(
        database: Arc<Mutex<D>>,
        scheduler: Arc<ReminderScheduler>,
        config: Config,
    ) -> AppContext<D> {
        AppContext {
            database,
            scheduler,
            config: Arc::new(config),
        }
    }
}

// Derived Clone would require D: Clone.
impl<D> Clone for AppContext<D> {
    fn clone(&self) -> Self {
        AppContext {
            database: self.database.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
        }
    }
}
