//! SQLite-backed dose ledger: obligations, dispatch receipts, schedules,
//! and caregiver relationships.
//!
//! The obligation table is keyed by the natural key
//! `(schedule_id, scheduled_for)` with a unique index, so every writer
//! upserts and concurrent writers converge on one row. Dispatch receipts
//! live in their own table; claiming one is an `INSERT OR IGNORE` whose
//! "row actually inserted" result is the at-most-once guarantee.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{EngineError, Result, StorageError};
use crate::ledger::state::{self, Transition};
use crate::ledger::{DoseObligation, DoseStatus, ObligationMeta};
use crate::schedule::{DoseKey, ScheduleDefinition, TimeOfDay};

use super::data_dir;

/// Receipt kind for the daily pre-dose reminder.
pub const RECEIPT_REMINDER: &str = "reminder";
/// Receipt kind for missed-dose alerts (one leg per recipient).
pub const RECEIPT_MISSED: &str = "missed_alert";

/// SQLite store for dose obligations and their dispatch receipts.
///
/// The connection is wrapped in a mutex so sweeps and request handlers can
/// share one store; per-key write serialization comes from holding the lock
/// across each read-validate-write transaction.
pub struct DoseLedger {
    conn: Mutex<Connection>,
}

impl DoseLedger {
    /// Open the ledger at `~/.config/dosewise/ledger.db`.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("ledger.db");
        let conn = Connection::open(&path).map_err(|source| {
            EngineError::Storage(StorageError::OpenFailed { path, source })
        })?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Open an in-memory ledger (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schedules (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                medication_id   TEXT NOT NULL,
                medication_name TEXT NOT NULL DEFAULT '',
                clock_time      TEXT NOT NULL,
                time_of_day     TEXT NOT NULL,
                weekdays        TEXT NOT NULL DEFAULT '',
                active          INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS caregivers (
                id             TEXT PRIMARY KEY,
                patient_id     TEXT NOT NULL,
                caregiver_id   TEXT NOT NULL,
                phone          TEXT,
                alerts_enabled INTEGER NOT NULL DEFAULT 1,
                UNIQUE(patient_id, caregiver_id)
            );

            CREATE TABLE IF NOT EXISTS dose_obligations (
                id              TEXT PRIMARY KEY,
                schedule_id     TEXT NOT NULL,
                scheduled_for   TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                medication_id   TEXT NOT NULL,
                medication_name TEXT NOT NULL DEFAULT '',
                time_of_day     TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                action_at       TEXT,
                snooze_until    TEXT,
                updated_at      TEXT NOT NULL,
                UNIQUE(schedule_id, scheduled_for)
            );

            CREATE TABLE IF NOT EXISTS dispatch_receipts (
                kind          TEXT NOT NULL,
                schedule_id   TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                leg           TEXT NOT NULL DEFAULT '',
                sent_at       TEXT NOT NULL,
                PRIMARY KEY (kind, schedule_id, scheduled_for, leg)
            );

            CREATE INDEX IF NOT EXISTS idx_obligations_scheduled_for
                ON dose_obligations(scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_obligations_user
                ON dose_obligations(user_id, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_schedules_user
                ON schedules(user_id);",
        )
        .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Schedules ────────────────────────────────────────────────────

    /// Insert or replace a schedule definition.
    pub fn upsert_schedule(&self, schedule: &ScheduleDefinition) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let weekdays = schedule
            .weekdays
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        conn.execute(
            "INSERT INTO schedules
             (id, user_id, medication_id, medication_name, clock_time, time_of_day, weekdays, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                user_id = ?2, medication_id = ?3, medication_name = ?4,
                clock_time = ?5, time_of_day = ?6, weekdays = ?7, active = ?8",
            params![
                schedule.id,
                schedule.user_id,
                schedule.medication_id,
                schedule.medication_name,
                schedule.clock_time,
                schedule.time_of_day.as_str(),
                weekdays,
                schedule.active as i64,
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn schedule_by_id(&self, id: &str) -> Result<Option<ScheduleDefinition>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, user_id, medication_id, medication_name, clock_time,
                        time_of_day, weekdays, active
                 FROM schedules WHERE id = ?1",
                params![id],
                row_to_schedule,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    pub fn active_schedules(&self, user_id: &str) -> Result<Vec<ScheduleDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, medication_id, medication_name, clock_time,
                        time_of_day, weekdays, active
                 FROM schedules WHERE user_id = ?1 AND active = 1",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![user_id], row_to_schedule)
            .map_err(StorageError::from)?;
        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(row.map_err(StorageError::from)?);
        }
        Ok(schedules)
    }

    /// Distinct users with at least one schedule, for sweeps and rollover.
    pub fn users(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT user_id FROM schedules ORDER BY user_id")
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StorageError::from)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.map_err(StorageError::from)?);
        }
        Ok(users)
    }

    // ── Caregivers ───────────────────────────────────────────────────

    pub fn add_caregiver(
        &self,
        patient_id: &str,
        caregiver_id: &str,
        phone: Option<&str>,
        alerts_enabled: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO caregivers (id, patient_id, caregiver_id, phone, alerts_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(patient_id, caregiver_id) DO UPDATE SET
                phone = ?4, alerts_enabled = ?5",
            params![
                Uuid::new_v4().to_string(),
                patient_id,
                caregiver_id,
                phone,
                alerts_enabled as i64,
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn alertable_caregivers(&self, patient_id: &str) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT caregiver_id, phone FROM caregivers
                 WHERE patient_id = ?1 AND alerts_enabled = 1
                 ORDER BY caregiver_id",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![patient_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(StorageError::from)?;
        let mut caregivers = Vec::new();
        for row in rows {
            caregivers.push(row.map_err(StorageError::from)?);
        }
        Ok(caregivers)
    }

    // ── Obligations ──────────────────────────────────────────────────

    /// Materialize the obligation row as `pending` if it does not exist.
    /// Idempotent; an existing row (any status) is left untouched.
    pub fn ensure_pending(
        &self,
        key: &DoseKey,
        meta: &ObligationMeta,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO dose_obligations
             (id, schedule_id, scheduled_for, user_id, medication_id,
              medication_name, time_of_day, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            params![
                Uuid::new_v4().to_string(),
                key.schedule_id,
                key.scheduled_for.to_rfc3339(),
                meta.user_id,
                meta.medication_id,
                meta.medication_name,
                meta.time_of_day.as_str(),
                now.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Fetch one obligation by natural key.
    pub fn get(&self, key: &DoseKey) -> Result<Option<DoseObligation>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {OBLIGATION_COLUMNS} FROM dose_obligations
                          WHERE schedule_id = ?1 AND scheduled_for = ?2"),
                params![key.schedule_id, key.scheduled_for.to_rfc3339()],
                row_to_obligation,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    /// Upsert a status write keyed by natural key, enforcing the state
    /// machine. Returns the authoritative row plus whether the write
    /// applied or was an idempotent terminal re-submission.
    pub fn upsert_status(
        &self,
        key: &DoseKey,
        meta: &ObligationMeta,
        status: DoseStatus,
        action_at: Option<DateTime<Utc>>,
        snooze_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(DoseObligation, Transition)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StorageError::from)?;

        let current: Option<DoseStatus> = tx
            .query_row(
                "SELECT status FROM dose_obligations
                 WHERE schedule_id = ?1 AND scheduled_for = ?2",
                params![key.schedule_id, key.scheduled_for.to_rfc3339()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StorageError::from)?
            .and_then(|s| DoseStatus::parse(&s));

        let transition = match state::validate(current, status) {
            Ok(t) => t,
            Err(terminal) => {
                return Err(EngineError::Conflict {
                    key: key.to_string(),
                    current: terminal.to_string(),
                    requested: status.to_string(),
                })
            }
        };

        if transition == Transition::Apply {
            tx.execute(
                "INSERT INTO dose_obligations
                 (id, schedule_id, scheduled_for, user_id, medication_id,
                  medication_name, time_of_day, status, action_at, snooze_until, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(schedule_id, scheduled_for) DO UPDATE SET
                    status = ?8, action_at = ?9, snooze_until = ?10, updated_at = ?11",
                params![
                    Uuid::new_v4().to_string(),
                    key.schedule_id,
                    key.scheduled_for.to_rfc3339(),
                    meta.user_id,
                    meta.medication_id,
                    meta.medication_name,
                    meta.time_of_day.as_str(),
                    status.as_str(),
                    action_at.map(|t| t.to_rfc3339()),
                    snooze_until.map(|t| t.to_rfc3339()),
                    now.to_rfc3339(),
                ],
            )
            .map_err(StorageError::from)?;
        }

        let obligation = tx
            .query_row(
                &format!("SELECT {OBLIGATION_COLUMNS} FROM dose_obligations
                          WHERE schedule_id = ?1 AND scheduled_for = ?2"),
                params![key.schedule_id, key.scheduled_for.to_rfc3339()],
                row_to_obligation,
            )
            .map_err(StorageError::from)?;

        tx.commit().map_err(StorageError::from)?;
        Ok((obligation, transition))
    }

    /// Obligations scheduled inside `(start, end]`, optionally filtered by
    /// status. Used by dispatch sweeps.
    pub fn query_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: Option<&[DoseStatus]>,
    ) -> Result<Vec<DoseObligation>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT {OBLIGATION_COLUMNS} FROM dose_obligations
             WHERE scheduled_for > ?1 AND scheduled_for <= ?2"
        );
        if let Some(statuses) = statuses {
            let list = statuses
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            sql.push_str(&format!(" AND status IN ({list})"));
        }
        sql.push_str(" ORDER BY scheduled_for");

        let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
        let rows = stmt
            .query_map(
                params![start.to_rfc3339(), end.to_rfc3339()],
                row_to_obligation,
            )
            .map_err(StorageError::from)?;
        let mut obligations = Vec::new();
        for row in rows {
            obligations.push(row.map_err(StorageError::from)?);
        }
        Ok(obligations)
    }

    /// Taken doses for a user on a calendar date. Used for streak-day
    /// bookkeeping (the first taken dose of a day extends the streak).
    pub fn taken_count_for_date(&self, user_id: &str, date: chrono::NaiveDate) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let prefix = format!("{date}T");
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM dose_obligations
                 WHERE user_id = ?1 AND status = 'taken' AND scheduled_for LIKE ?2 || '%'",
                params![user_id, prefix],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StorageError::from)?;
        Ok(count)
    }

    // ── Dispatch receipts ────────────────────────────────────────────

    /// Claim a dispatch receipt. Returns true when this caller won the
    /// claim; false means some sweep already sent this leg.
    pub fn claim_receipt(
        &self,
        kind: &str,
        key: &DoseKey,
        leg: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO dispatch_receipts
                 (kind, schedule_id, scheduled_for, leg, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kind,
                    key.schedule_id,
                    key.scheduled_for.to_rfc3339(),
                    leg,
                    now.to_rfc3339(),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(inserted == 1)
    }

    /// Release a claimed receipt after a failed send so the next sweep
    /// retries this leg.
    pub fn release_receipt(&self, kind: &str, key: &DoseKey, leg: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM dispatch_receipts
             WHERE kind = ?1 AND schedule_id = ?2 AND scheduled_for = ?3 AND leg = ?4",
            params![kind, key.schedule_id, key.scheduled_for.to_rfc3339(), leg],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn has_receipt(&self, kind: &str, key: &DoseKey, leg: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM dispatch_receipts
                 WHERE kind = ?1 AND schedule_id = ?2 AND scheduled_for = ?3 AND leg = ?4",
                params![kind, key.schedule_id, key.scheduled_for.to_rfc3339(), leg],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }
}

const OBLIGATION_COLUMNS: &str = "id, schedule_id, scheduled_for, user_id, medication_id, \
     medication_name, time_of_day, status, action_at, snooze_until, updated_at";

/// Parse an RFC3339 timestamp stored in column `idx`. A row that fails to
/// parse is surfaced as a query error rather than silently read back with
/// a substitute time, which would throw off window and timeliness math.
fn parse_datetime(idx: usize, dt_str: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<ScheduleDefinition> {
    let time_of_day: String = row.get(5)?;
    let weekdays: String = row.get(6)?;
    Ok(ScheduleDefinition {
        id: row.get(0)?,
        user_id: row.get(1)?,
        medication_id: row.get(2)?,
        medication_name: row.get(3)?,
        clock_time: row.get(4)?,
        time_of_day: TimeOfDay::parse(&time_of_day).unwrap_or(TimeOfDay::Morning),
        weekdays: weekdays
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect(),
        active: row.get::<_, i64>(7)? != 0,
    })
}

fn row_to_obligation(row: &rusqlite::Row) -> rusqlite::Result<DoseObligation> {
    let scheduled_for: String = row.get(2)?;
    let time_of_day: String = row.get(6)?;
    let status: String = row.get(7)?;
    let action_at: Option<String> = row.get(8)?;
    let snooze_until: Option<String> = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(DoseObligation {
        id: row.get(0)?,
        key: DoseKey {
            schedule_id: row.get(1)?,
            scheduled_for: parse_datetime(2, &scheduled_for)?,
        },
        user_id: row.get(3)?,
        medication_id: row.get(4)?,
        medication_name: row.get(5)?,
        time_of_day: TimeOfDay::parse(&time_of_day).unwrap_or(TimeOfDay::Morning),
        status: DoseStatus::parse(&status).unwrap_or(DoseStatus::Pending),
        action_at: action_at.as_deref().map(|s| parse_datetime(8, s)).transpose()?,
        snooze_until: snooze_until
            .as_deref()
            .map(|s| parse_datetime(9, s))
            .transpose()?,
        updated_at: parse_datetime(10, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(minute: u32) -> DoseKey {
        DoseKey {
            schedule_id: "sched-1".to_string(),
            scheduled_for: Utc.with_ymd_and_hms(2026, 3, 2, 8, minute, 0).unwrap(),
        }
    }

    fn meta() -> ObligationMeta {
        ObligationMeta {
            user_id: "user-1".to_string(),
            medication_id: "med-1".to_string(),
            medication_name: "Metformin".to_string(),
            time_of_day: TimeOfDay::Morning,
        }
    }

    #[test]
    fn ensure_pending_is_idempotent() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        ledger.ensure_pending(&key(0), &meta(), now).unwrap();
        ledger.ensure_pending(&key(0), &meta(), now).unwrap();

        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
        let rows = ledger.query_window(start, end, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, DoseStatus::Pending);
    }

    #[test]
    fn ensure_pending_does_not_clobber_terminal_status() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        ledger
            .upsert_status(&key(0), &meta(), DoseStatus::Taken, Some(now), None, now)
            .unwrap();
        ledger.ensure_pending(&key(0), &meta(), now).unwrap();
        let row = ledger.get(&key(0)).unwrap().unwrap();
        assert_eq!(row.status, DoseStatus::Taken);
    }

    #[test]
    fn terminal_resubmission_is_noop_not_error() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        let (_, t1) = ledger
            .upsert_status(&key(0), &meta(), DoseStatus::Taken, Some(now), None, now)
            .unwrap();
        assert_eq!(t1, Transition::Apply);

        let (row, t2) = ledger
            .upsert_status(&key(0), &meta(), DoseStatus::Taken, Some(now), None, now)
            .unwrap();
        assert_eq!(t2, Transition::Noop);
        assert_eq!(row.status, DoseStatus::Taken);
    }

    #[test]
    fn conflicting_terminal_write_is_rejected() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        ledger
            .upsert_status(&key(0), &meta(), DoseStatus::Skipped, Some(now), None, now)
            .unwrap();
        let err = ledger
            .upsert_status(&key(0), &meta(), DoseStatus::Taken, Some(now), None, now)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[test]
    fn receipt_claim_wins_once() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        assert!(ledger.claim_receipt(RECEIPT_REMINDER, &key(0), "", now).unwrap());
        assert!(!ledger.claim_receipt(RECEIPT_REMINDER, &key(0), "", now).unwrap());

        // Release makes the leg claimable again.
        ledger.release_receipt(RECEIPT_REMINDER, &key(0), "").unwrap();
        assert!(ledger.claim_receipt(RECEIPT_REMINDER, &key(0), "", now).unwrap());

        // Different legs claim independently.
        assert!(ledger.claim_receipt(RECEIPT_MISSED, &key(0), "user", now).unwrap());
        assert!(ledger.claim_receipt(RECEIPT_MISSED, &key(0), "cg:alice", now).unwrap());
        assert!(!ledger.claim_receipt(RECEIPT_MISSED, &key(0), "user", now).unwrap());
    }

    #[test]
    fn schedules_round_trip() {
        let ledger = DoseLedger::open_memory().unwrap();
        let sched = ScheduleDefinition {
            id: "sched-1".to_string(),
            user_id: "user-1".to_string(),
            medication_id: "med-1".to_string(),
            medication_name: "Metformin".to_string(),
            clock_time: "08:00".to_string(),
            time_of_day: TimeOfDay::Morning,
            weekdays: vec![1, 2, 3, 4, 5],
            active: true,
        };
        ledger.upsert_schedule(&sched).unwrap();

        let loaded = ledger.schedule_by_id("sched-1").unwrap().unwrap();
        assert_eq!(loaded.weekdays, vec![1, 2, 3, 4, 5]);
        assert_eq!(loaded.clock_time, "08:00");

        assert_eq!(ledger.active_schedules("user-1").unwrap().len(), 1);
        assert_eq!(ledger.users().unwrap(), vec!["user-1".to_string()]);
    }

    #[test]
    fn corrupted_timestamp_surfaces_as_error() {
        let ledger = DoseLedger::open_memory().unwrap();
        let now = Utc::now();
        ledger.ensure_pending(&key(0), &meta(), now).unwrap();
        ledger
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE dose_obligations SET updated_at = 'not-a-timestamp'",
                [],
            )
            .unwrap();

        let err = ledger.get(&key(0)).unwrap_err();
        assert!(matches!(err, EngineError::Storage(StorageError::QueryFailed(_))));
    }

    #[test]
    fn caregivers_filter_on_alerts_enabled() {
        let ledger = DoseLedger::open_memory().unwrap();
        ledger
            .add_caregiver("user-1", "cg-1", Some("+15550100"), true)
            .unwrap();
        ledger.add_caregiver("user-1", "cg-2", None, false).unwrap();

        let alertable = ledger.alertable_caregivers("user-1").unwrap();
        assert_eq!(alertable.len(), 1);
        assert_eq!(alertable[0].0, "cg-1");
        assert_eq!(alertable[0].1.as_deref(), Some("+15550100"));
    }
}
