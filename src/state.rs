use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: AppConfig) -> Self {
        Self {
            orm,
            config: Arc::new(config),
        }
    }

    /// Raw sqlx pool behind the ORM connection, used for the audit trail.
    pub fn pool(&self) -> &sqlx::PgPool {
        self.orm.get_postgres_connection_pool()
    }
}
