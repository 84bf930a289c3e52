use crate::pipeline::{CompressionMethod, CompressionReport, OutcomeFlag};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One recorded compression run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub owner: String,
    pub timestamp: DateTime<Utc>,
    pub method: CompressionMethod,
    pub original_tokens: i64,
    pub compressed_tokens: i64,
    pub budget: i64,
    pub budget_met: bool,
    pub flags: Vec<OutcomeFlag>,
}

impl RunRecord {
    pub fn from_report(owner: &str, report: &CompressionReport) -> Self {
        Self {
            owner: owner.to_string(),
            timestamp: Utc::now(),
            method: report.method,
            original_tokens: report.original_tokens as i64,
            compressed_tokens: report.compressed_tokens as i64,
            budget: report.budget as i64,
            budget_met: report.budget_met(),
            flags: report.flags.clone(),
        }
    }
}

/// Aggregates over an owner's runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub runs: i64,
    pub tokens_saved: i64,
    pub budget_met_runs: i64,
    /// Mean compressed/original ratio; 1.0 when there are no runs
    pub mean_ratio: f64,
}

pub struct RunLog {
    conn: Connection,
}

impl RunLog {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                original_tokens INTEGER NOT NULL,
                compressed_tokens INTEGER NOT NULL,
                budget INTEGER NOT NULL,
                budget_met INTEGER NOT NULL,
                flags TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_owner ON runs(owner);
            CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON runs(timestamp);
            ",
        )?;
        Ok(())
    }

    pub fn insert(&self, run: &RunRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (owner, timestamp, method, original_tokens, compressed_tokens, budget, budget_met, flags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                run.owner,
                run.timestamp.to_rfc3339(),
                serde_json::to_string(&run.method)?,
                run.original_tokens,
                run.compressed_tokens,
                run.budget,
                run.budget_met,
                serde_json::to_string(&run.flags)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first
    pub fn recent(&self, owner: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT owner, timestamp, method, original_tokens, compressed_tokens, budget, budget_met, flags
             FROM runs WHERE owner = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![owner, limit as i64])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(Self::row_to_run(row)?);
        }
        Ok(runs)
    }

    pub fn stats(&self, owner: &str) -> Result<RunStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(original_tokens - compressed_tokens), 0),
                    COALESCE(SUM(budget_met), 0),
                    AVG(CASE WHEN original_tokens > 0
                             THEN CAST(compressed_tokens AS REAL) / original_tokens
                             ELSE 1.0 END)
             FROM runs WHERE owner = ?1",
            params![owner],
            |row| {
                Ok(RunStats {
                    runs: row.get(0)?,
                    tokens_saved: row.get(1)?,
                    budget_met_runs: row.get(2)?,
                    mean_ratio: row.get::<_, Option<f64>>(3)?.unwrap_or(1.0),
                })
            },
        )?;
        Ok(stats)
    }

    fn row_to_run(row: &rusqlite::Row) -> Result<RunRecord> {
        Ok(RunRecord {
            owner: row.get(0)?,
            timestamp: row.get::<_, String>(1)?.parse()?,
            method: serde_json::from_str(&row.get::<_, String>(2)?)?,
            original_tokens: row.get(3)?,
            compressed_tokens: row.get(4)?,
            budget: row.get(5)?,
            budget_met: row.get(6)?,
            flags: serde_json::from_str(&row.get::<_, String>(7)?)?,
        })
    }
}
