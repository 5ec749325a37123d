//! SQLite-backed break ledger.
//!
//! Persistent log of break and session events with derived compliance
//! aggregates:
//! - every required break, with completion or skip outcome
//! - per-day aggregates kept current on every outcome write
//! - application sessions (process start to stop)

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::LedgerError;
use crate::timer::BreakLedger;

/// A single recorded break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Break {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub was_completed: bool,
    pub was_skipped: bool,
    pub duration_seconds: u32,
}

/// Aggregated statistics for a single day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub breaks_required: u32,
    pub breaks_completed: u32,
    pub breaks_skipped: u32,
    pub total_work_minutes: u32,
    pub compliance_rate: f64,
}

/// Reporting period for compliance aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
}

impl Period {
    /// Start of the period, counting back from `now`. Day boundaries are UTC.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Today => day_start(now.date_naive()),
            Period::Week => now - chrono::Duration::days(7),
            Period::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - chrono::Duration::days(30)),
        }
    }
}

/// Compliance statistics for a reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub period: Period,
    pub total_breaks: u32,
    pub completed_breaks: u32,
    pub skipped_breaks: u32,
    pub compliance_rate: f64,
    pub average_per_day: f64,
}

/// Compliance rate as a percentage. Zero when no breaks were required.
pub fn compliance_rate(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(completed) / f64::from(total) * 100.0
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite ledger for break and session records.
///
/// The connection sits behind a mutex so the ledger can be shared with the
/// scheduler's background wake-up task.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open the ledger at `~/.config/restwatch/restwatch.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, LedgerError> {
        let path = data_dir()?.join("restwatch.db");
        let conn = Connection::open(&path)
            .map_err(|source| LedgerError::OpenFailed { path, source })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory ledger (for tests).
    pub fn open_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        migrations::migrate(&conn).map_err(|e| LedgerError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start of a new application session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn start_session(&self) -> Result<i64, LedgerError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (started_at) VALUES (?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark a session as ended.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn end_session(&self, session_id: i64, paused: Duration) -> Result<(), LedgerError> {
        self.conn().execute(
            "UPDATE sessions SET ended_at = ?1, paused_duration_seconds = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), paused.as_secs(), session_id],
        )?;
        Ok(())
    }

    /// All breaks started on `date`, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn breaks_for_date(&self, date: NaiveDate) -> Result<Vec<Break>, LedgerError> {
        let start = day_start(date);
        let end = start + chrono::Duration::days(1);

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, started_at, completed_at, was_completed, was_skipped,
                    COALESCE(duration_seconds, 0)
             FROM breaks
             WHERE started_at >= ?1 AND started_at < ?2
             ORDER BY started_at DESC",
        )?;
        let rows = stmt.query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
            let started_raw: String = row.get(1)?;
            let completed_raw: Option<String> = row.get(2)?;
            let completed_at = match completed_raw {
                Some(raw) => Some(parse_timestamp(2, &raw)?),
                None => None,
            };
            Ok(Break {
                id: row.get(0)?,
                started_at: parse_timestamp(1, &started_raw)?,
                completed_at,
                was_completed: row.get(3)?,
                was_skipped: row.get(4)?,
                duration_seconds: row.get(5)?,
            })
        })?;

        let mut breaks = Vec::new();
        for row in rows {
            breaks.push(row?);
        }
        Ok(breaks)
    }

    /// Aggregated stats for `date`, zeros when no row exists yet.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats, LedgerError> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT breaks_required, breaks_completed, breaks_skipped,
                    total_work_minutes, COALESCE(compliance_rate, 0)
             FROM daily_stats
             WHERE date = ?1",
            params![date_str],
            |row| {
                Ok(DailyStats {
                    date,
                    breaks_required: row.get(0)?,
                    breaks_completed: row.get(1)?,
                    breaks_skipped: row.get(2)?,
                    total_work_minutes: row.get(3)?,
                    compliance_rate: row.get(4)?,
                })
            },
        );

        match result {
            Ok(stats) => Ok(stats),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(DailyStats {
                date,
                breaks_required: 0,
                breaks_completed: 0,
                breaks_skipped: 0,
                total_work_minutes: 0,
                compliance_rate: 0.0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Compliance aggregates for a reporting period ending now.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn compliance_report(&self, period: Period) -> Result<ComplianceReport, LedgerError> {
        let now = Utc::now();
        let start = period.start(now);

        let (total, completed, skipped) = {
            let conn = self.conn();
            conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN was_completed = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END), 0)
                 FROM breaks
                 WHERE started_at >= ?1",
                params![start.to_rfc3339()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )?
        };

        let days = ((now - start).num_hours() / 24).max(1);
        let average_per_day = f64::from(completed) / days as f64;

        Ok(ComplianceReport {
            period,
            total_breaks: total,
            completed_breaks: completed,
            skipped_breaks: skipped,
            compliance_rate: compliance_rate(completed, total),
            average_per_day,
        })
    }

    /// Recompute and upsert the daily_stats row covering `at`.
    fn update_daily_stats(&self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let date = at.date_naive();
        let date_str = date.format("%Y-%m-%d").to_string();
        let start = day_start(date);
        let end = start + chrono::Duration::days(1);

        let conn = self.conn();
        let (required, completed, skipped) = conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN was_completed = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN was_skipped = 1 THEN 1 ELSE 0 END), 0)
             FROM breaks
             WHERE started_at >= ?1 AND started_at < ?2",
            params![start.to_rfc3339(), end.to_rfc3339()],
            |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            },
        )?;

        conn.execute(
            "INSERT INTO daily_stats (date, breaks_required, breaks_completed, breaks_skipped, compliance_rate)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(date) DO UPDATE SET
               breaks_required = excluded.breaks_required,
               breaks_completed = excluded.breaks_completed,
               breaks_skipped = excluded.breaks_skipped,
               compliance_rate = excluded.compliance_rate",
            params![
                date_str,
                required,
                completed,
                skipped,
                compliance_rate(completed, required)
            ],
        )?;

        Ok(())
    }
}

impl BreakLedger for Ledger {
    fn record_break_start(&self) -> Result<i64, LedgerError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO breaks (started_at) VALUES (?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_break_complete(&self, break_id: i64, duration: Duration) -> Result<(), LedgerError> {
        let now = Utc::now();
        self.conn().execute(
            "UPDATE breaks
             SET completed_at = ?1, was_completed = 1, duration_seconds = ?2
             WHERE id = ?3",
            params![now.to_rfc3339(), duration.as_secs(), break_id],
        )?;
        self.update_daily_stats(now)
    }

    fn record_break_skipped(&self, break_id: i64) -> Result<(), LedgerError> {
        let now = Utc::now();
        self.conn().execute(
            "UPDATE breaks SET completed_at = ?1, was_skipped = 1 WHERE id = ?2",
            params![now.to_rfc3339(), break_id],
        )?;
        self.update_daily_stats(now)
    }
}
