use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use sqlx::error::ErrorKind;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

static MIGRATOR: Migrator = sqlx::migrate!("db/migrations");

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

pub struct DbPool(pub SqlitePool);

/// Constraint category of a failed statement, decided once here so the
/// registries never look at SQLite result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    Other,
}

pub fn store_error_kind(err: &sqlx::Error) -> StoreErrorKind {
    match err {
        sqlx::Error::Database(db_err) => match db_err.kind() {
            ErrorKind::UniqueViolation => StoreErrorKind::UniqueViolation,
            ErrorKind::ForeignKeyViolation => StoreErrorKind::ForeignKeyViolation,
            _ => StoreErrorKind::Other,
        },
        _ => StoreErrorKind::Other,
    }
}

/// Backend code of a failed statement, if the driver reported one.
pub fn store_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

pub async fn open_pool(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = if database_url.contains(":memory:") {
        // each connection to :memory: is its own database, keep exactly one alive
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(opts)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts.journal_mode(SqliteJournalMode::Wal))
            .await?
    };
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

pub struct DbPoolFairing();
#[rocket::async_trait]
impl Fairing for DbPoolFairing {
    fn info(&self) -> Info {
        Info {
            name: "SQLite Database Pool with Migrations",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let figment = rocket.figment();
        let database_url = if cfg!(test) {
            "sqlite::memory:".to_string()
        } else {
            match figment.extract_inner::<String>("database_url") {
                Ok(url) => url,
                Err(err) => {
                    error!("database_url is not configured: {err}");
                    return Err(rocket);
                }
            }
        };
        let max_connections = figment
            .extract_inner::<u32>("max_connections")
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        info!("Opening database: {database_url}");
        let pool = match open_pool(&database_url, max_connections).await {
            Ok(pool) => pool,
            Err(err) => {
                error!("Database initialization error: {:?}", err);
                return Err(rocket);
            }
        };
        info!("Migrations applied successfully!");

        Ok(rocket.manage(DbPool(pool)))
    }
}
