use std::time::{Instant, SystemTime};

use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    pool: Option<SqlitePool>,
}

impl AppState {
    pub fn new(pool: Option<SqlitePool>) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            pool,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }
}
