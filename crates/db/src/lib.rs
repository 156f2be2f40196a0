use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub use sea_orm::{ConnectionTrait, DatabaseConnection as DbConn, DbErr};

pub mod entities;
pub mod models;

#[derive(Clone)]
pub struct DbService {
    pub conn: DatabaseConnection,
}

impl DbService {
    /// Connect to the sqlite database and bring the schema up to date.
    pub async fn new(database_url: &str) -> Result<DbService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(5)
            .connect_timeout(Duration::from_secs(30))
            .sqlx_logging(false);
        let conn = Database::connect(options).await?;
        db_migration::Migrator::up(&conn, None).await?;
        Ok(DbService { conn })
    }

    /// True when the connection still answers a trivial query.
    pub async fn is_connected(&self) -> bool {
        self.conn.ping().await.is_ok()
    }
}
