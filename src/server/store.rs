//! SQLite persistence for the daily leaderboard.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::TOP_LIMIT;
use crate::record::RankingRecord;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS rankings (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    score INTEGER NOT NULL,
    level INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    device TEXT NOT NULL DEFAULT 'Unknown',
    date TEXT NOT NULL
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_date_score
    ON rankings (date, score DESC, level DESC, timestamp ASC)";

/// Aggregates for one calendar day. The optional fields are `NULL` on an empty day.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct DayStats {
    pub total_players: i64,
    pub highest_score: Option<i64>,
    pub highest_level: Option<i64>,
    pub average_score: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct RankingStore {
    pool: SqlitePool,
}

impl RankingStore {
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private database for tests. One connection that never expires, since
    /// every `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Store `record` and return its rank among records of the same day.
    ///
    /// Insert and count run in one transaction, so the rank reflects a
    /// snapshot that includes this record and nothing half-written.
    pub async fn insert_and_rank(&self, record: &RankingRecord) -> Result<u32, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO rankings (id, name, score, level, timestamp, device, date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(i64::from(record.score))
        .bind(i64::from(record.level))
        .bind(record.timestamp)
        .bind(&record.device)
        .bind(&record.date)
        .execute(&mut *tx)
        .await?;

        let rank: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) + 1 FROM rankings
             WHERE date = ?1 AND (
                score > ?2
                OR (score = ?2 AND level > ?3)
                OR (score = ?2 AND level = ?3 AND timestamp < ?4)
             )",
        )
        .bind(&record.date)
        .bind(i64::from(record.score))
        .bind(i64::from(record.level))
        .bind(record.timestamp)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rank as u32)
    }

    /// Best records of `date`: score desc, level desc, earliest first.
    pub async fn top(&self, date: &str) -> Result<Vec<RankingRecord>, sqlx::Error> {
        sqlx::query_as::<_, RankingRecord>(
            "SELECT id, name, score, level, timestamp, device, date FROM rankings
             WHERE date = ?
             ORDER BY score DESC, level DESC, timestamp ASC
             LIMIT ?",
        )
        .bind(date)
        .bind(i64::from(TOP_LIMIT))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn stats(&self, date: &str) -> Result<DayStats, sqlx::Error> {
        sqlx::query_as::<_, DayStats>(
            "SELECT COUNT(*) AS total_players,
                    MAX(score) AS highest_score,
                    MAX(level) AS highest_level,
                    AVG(score) AS average_score
             FROM rankings WHERE date = ?",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await
    }

    /// Delete every record dated before `cutoff` (`YYYY-MM-DD`). Returns the count.
    pub async fn delete_before(&self, cutoff: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rankings WHERE date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
