use super::{ForecastPoint, ForecastRequest, ForecastStore, StoreError, FORECAST_TABLE, REQUESTS_TABLE};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store with the same tables as the hosted backend.
///
/// Automatically creates schema on first use.
#[derive(Debug)]
pub struct SqliteStore {
    // Connection is not Sync; the pipeline is sequential so a plain mutex suffices.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a file-based store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema cannot
    /// be created.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let store = SqliteStore {
            conn: Mutex::new(Connection::open(db_path)?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Creates a store backed by an in-memory database.
    ///
    /// Useful for testing.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let store = SqliteStore {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    currency TEXT NOT NULL,
                    startdate TEXT NOT NULL,
                    enddate TEXT NOT NULL,
                    processed INTEGER NOT NULL DEFAULT 0
                )",
                REQUESTS_TABLE
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    currency TEXT NOT NULL,
                    date TEXT NOT NULL,
                    value REAL NOT NULL
                )",
                FORECAST_TABLE
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_forecast_currency ON {}(currency)",
                FORECAST_TABLE
            ),
            [],
        )?;

        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> SqliteResult<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))?;
        Ok(f(&mut conn)?)
    }

    /// Records a new unprocessed request and returns its id.
    ///
    /// Stands in for the upstream producer when running against a local file.
    pub fn submit_request(
        &self,
        currency: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (currency, startdate, enddate, processed) VALUES (?1, ?2, ?3, 0)",
                    REQUESTS_TABLE
                ),
                params![currency, start, end],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Every request regardless of state, ordered by id.
    pub fn all_requests(&self) -> Result<Vec<ForecastRequest>, StoreError> {
        self.query_requests(false)
    }

    fn query_requests(&self, pending_only: bool) -> Result<Vec<ForecastRequest>, StoreError> {
        let filter = if pending_only { "WHERE processed = 0" } else { "" };
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, currency, startdate, enddate, processed FROM {} {} ORDER BY id",
                REQUESTS_TABLE, filter
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(ForecastRequest {
                    id: row.get(0)?,
                    currency: row.get(1)?,
                    start_date: row.get(2)?,
                    end_date: row.get(3)?,
                    processed: row.get(4)?,
                })
            })?;
            rows.collect()
        })
    }

    #[cfg(test)]
    fn table_exists(&self, table_name: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
            stmt.exists([table_name])
        })
    }
}

#[async_trait]
impl ForecastStore for SqliteStore {
    async fn pending_requests(&self) -> Result<Vec<ForecastRequest>, StoreError> {
        self.query_requests(true)
    }

    async fn delete_forecast(&self, currency: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("DELETE FROM {} WHERE currency = ?1", FORECAST_TABLE),
                [currency],
            )?;
            Ok(())
        })
    }

    async fn insert_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} (currency, date, value) VALUES (?1, ?2, ?3)",
                    FORECAST_TABLE
                ))?;
                for point in points {
                    stmt.execute(params![point.currency, point.date, point.value])?;
                }
            }
            tx.commit()
        })
    }

    async fn mark_processed(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE {} SET processed = 1 WHERE id = ?1", REQUESTS_TABLE),
                [id],
            )?;
            Ok(())
        })
    }

    async fn forecast_for(&self, currency: &str) -> Result<Vec<ForecastPoint>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT currency, date, value FROM {} WHERE currency = ?1 ORDER BY date",
                FORECAST_TABLE
            ))?;
            let rows = stmt.query_map([currency], |row| {
                Ok(ForecastPoint {
                    currency: row.get(0)?,
                    date: row.get(1)?,
                    value: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }
}
