pub mod api;
pub mod config;
pub mod db;
pub mod scheduling;
pub mod validation;

pub use db::DbPool;

use config::Config;
use scheduling::Scheduler;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let scheduler = Scheduler::new(db.clone(), config.scheduling.conflict_window());
        Self {
            config,
            db,
            scheduler,
        }
    }
}
