//! SQLite-backed reward store: accounts, spin history, badges, challenge
//! progress, and inventory.
//!
//! Spin history rows carry an `applied` flag: history is persisted before
//! the account mutation, so a crash between the two leaves an unapplied row
//! that the recovery pass completes exactly once, honoring the already
//! resolved prize instead of re-rolling.

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{EngineError, Result, RewardError, StorageError};
use crate::rewards::slot::{Prize, SlotSymbol, SpinOutcome};
use crate::rewards::{InventoryEntry, RewardAccount};

use super::data_dir;

/// A persisted spin history row.
#[derive(Debug, Clone)]
pub struct SpinHistoryRecord {
    pub id: String,
    pub user_id: String,
    pub symbols: [SlotSymbol; 3],
    pub outcome: SpinOutcome,
    pub prize: Prize,
    pub coins_credited: i64,
    pub applied: bool,
    pub created_at: DateTime<Utc>,
}

/// SQLite store for the reward economy.
pub struct RewardStore {
    conn: Mutex<Connection>,
}

impl RewardStore {
    /// Open the store at `~/.config/dosewise/rewards.db`.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("rewards.db");
        let conn = Connection::open(&path).map_err(|source| {
            EngineError::Storage(StorageError::OpenFailed { path, source })
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reward_accounts (
                user_id           TEXT PRIMARY KEY,
                coins             INTEGER NOT NULL DEFAULT 0,
                available_spins   INTEGER NOT NULL DEFAULT 0,
                total_spins_used  INTEGER NOT NULL DEFAULT 0,
                streak_multiplier REAL NOT NULL DEFAULT 1.0,
                streak_days       INTEGER NOT NULL DEFAULT 0,
                shield_expires_at TEXT,
                updated_at        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS spin_history (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                symbols        TEXT NOT NULL,
                outcome        TEXT NOT NULL,
                prize          TEXT NOT NULL,
                coins_credited INTEGER NOT NULL DEFAULT 0,
                applied        INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS badges (
                user_id   TEXT NOT NULL,
                badge     TEXT NOT NULL,
                earned_at TEXT NOT NULL,
                PRIMARY KEY (user_id, badge)
            );

            CREATE TABLE IF NOT EXISTS challenge_progress (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                challenge_id   TEXT NOT NULL,
                week_start     TEXT NOT NULL,
                progress       INTEGER NOT NULL DEFAULT 0,
                completed      INTEGER NOT NULL DEFAULT 0,
                completed_at   TEXT,
                reward_claimed INTEGER NOT NULL DEFAULT 0,
                UNIQUE(user_id, challenge_id, week_start)
            );

            CREATE TABLE IF NOT EXISTS inventory (
                user_id     TEXT NOT NULL,
                item_id     TEXT NOT NULL,
                category    TEXT NOT NULL DEFAULT '',
                expires_at  TEXT,
                equipped    INTEGER NOT NULL DEFAULT 0,
                acquired_at TEXT NOT NULL,
                PRIMARY KEY (user_id, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_spin_history_user
                ON spin_history(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_spin_history_unapplied
                ON spin_history(applied) WHERE applied = 0;",
        )
        .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Accounts ─────────────────────────────────────────────────────

    /// Load an account, creating it with zeroed balances on first use.
    pub fn get_or_create_account(&self, user_id: &str, now: DateTime<Utc>) -> Result<RewardAccount> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO reward_accounts (user_id, updated_at) VALUES (?1, ?2)",
            params![user_id, now.to_rfc3339()],
        )
        .map_err(StorageError::from)?;
        let account = conn
            .query_row(
                "SELECT user_id, coins, available_spins, total_spins_used,
                        streak_multiplier, streak_days, shield_expires_at, updated_at
                 FROM reward_accounts WHERE user_id = ?1",
                params![user_id],
                row_to_account,
            )
            .map_err(StorageError::from)?;
        Ok(account)
    }

    /// Persist the full account row. Coin balance is clamped at zero.
    pub fn save_account(&self, account: &RewardAccount) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE reward_accounts SET
                coins = ?2, available_spins = ?3, total_spins_used = ?4,
                streak_multiplier = ?5, streak_days = ?6,
                shield_expires_at = ?7, updated_at = ?8
             WHERE user_id = ?1",
            params![
                account.user_id,
                account.coins.max(0),
                account.available_spins.max(0),
                account.total_spins_used,
                account.streak_multiplier,
                account.streak_days,
                account.shield_expires_at.map(|t| t.to_rfc3339()),
                account.updated_at.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Persist the account mutation and flip the history row's `applied`
    /// flag in one transaction, so a spin apply is atomic with its record.
    pub fn apply_spin(&self, account: &RewardAccount, spin_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "UPDATE reward_accounts SET
                coins = ?2, available_spins = ?3, total_spins_used = ?4,
                streak_multiplier = ?5, streak_days = ?6,
                shield_expires_at = ?7, updated_at = ?8
             WHERE user_id = ?1",
            params![
                account.user_id,
                account.coins.max(0),
                account.available_spins.max(0),
                account.total_spins_used,
                account.streak_multiplier,
                account.streak_days,
                account.shield_expires_at.map(|t| t.to_rfc3339()),
                account.updated_at.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        tx.execute(
            "UPDATE spin_history SET applied = 1 WHERE id = ?1",
            params![spin_id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    // ── Spin history ─────────────────────────────────────────────────

    /// Persist a resolved-but-not-yet-applied spin.
    pub fn insert_spin_history(&self, record: &SpinHistoryRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO spin_history
             (id, user_id, symbols, outcome, prize, coins_credited, applied, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.user_id,
                serde_json::to_string(&record.symbols)?,
                serde_json::to_string(&record.outcome)?,
                serde_json::to_string(&record.prize)?,
                record.coins_credited,
                record.applied as i64,
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn mark_spin_applied(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE spin_history SET applied = 1 WHERE id = ?1",
            params![id],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// History rows whose prize was never applied (crash between persist
    /// and apply). Oldest first.
    pub fn unapplied_spins(&self) -> Result<Vec<SpinHistoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, symbols, outcome, prize, coins_credited, applied, created_at
                 FROM spin_history WHERE applied = 0 ORDER BY created_at",
            )
            .map_err(StorageError::from)?;
        self.collect_history(&mut stmt, params![])
    }

    /// Most recent spins for a user.
    pub fn spin_history(&self, user_id: &str, limit: i64) -> Result<Vec<SpinHistoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, symbols, outcome, prize, coins_credited, applied, created_at
                 FROM spin_history WHERE user_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(StorageError::from)?;
        self.collect_history(&mut stmt, params![user_id, limit])
    }

    fn collect_history<P: rusqlite::Params>(
        &self,
        stmt: &mut rusqlite::Statement<'_>,
        params: P,
    ) -> Result<Vec<SpinHistoryRecord>> {
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(StorageError::from)?;
        let mut records = Vec::new();
        for row in rows {
            let (id, user_id, symbols, outcome, prize, coins_credited, applied, created_at) =
                row.map_err(StorageError::from)?;
            records.push(SpinHistoryRecord {
                id,
                user_id,
                symbols: serde_json::from_str(&symbols)?,
                outcome: serde_json::from_str(&outcome)?,
                prize: serde_json::from_str(&prize)?,
                coins_credited,
                applied: applied != 0,
                created_at: parse_datetime(7, &created_at).map_err(StorageError::from)?,
            });
        }
        Ok(records)
    }

    // ── Badges ───────────────────────────────────────────────────────

    /// Grant a badge. Returns true when newly granted; an existing
    /// `(user, badge)` pair is a silent no-op.
    pub fn insert_badge(&self, user_id: &str, badge: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO badges (user_id, badge, earned_at) VALUES (?1, ?2, ?3)",
                params![user_id, badge, now.to_rfc3339()],
            )
            .map_err(StorageError::from)?;
        Ok(inserted == 1)
    }

    pub fn badge_count(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM badges WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StorageError::from)?;
        Ok(count)
    }

    pub fn badges_for(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT badge FROM badges WHERE user_id = ?1 ORDER BY earned_at")
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(StorageError::from)?;
        let mut badges = Vec::new();
        for row in rows {
            badges.push(row.map_err(StorageError::from)?);
        }
        Ok(badges)
    }

    // ── Challenge progress ───────────────────────────────────────────

    /// Insert-if-absent one progress row per (user, challenge, week).
    pub fn ensure_challenge_row(
        &self,
        user_id: &str,
        challenge_id: &str,
        week_start: NaiveDate,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO challenge_progress
             (id, user_id, challenge_id, week_start)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                challenge_id,
                week_start.to_string(),
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    pub fn challenge_rows(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<ChallengeRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, challenge_id, week_start, progress,
                        completed, completed_at, reward_claimed
                 FROM challenge_progress
                 WHERE user_id = ?1 AND week_start = ?2
                 ORDER BY challenge_id",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![user_id, week_start.to_string()], row_to_challenge)
            .map_err(StorageError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StorageError::from)?);
        }
        Ok(out)
    }

    pub fn challenge_row_by_id(&self, id: &str) -> Result<Option<ChallengeRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, user_id, challenge_id, week_start, progress,
                        completed, completed_at, reward_claimed
                 FROM challenge_progress WHERE id = ?1",
                params![id],
                row_to_challenge,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    /// Increment progress for a not-yet-completed row, marking it completed
    /// when `target` is reached. Progress is monotonically non-decreasing.
    pub fn increment_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        week_start: NaiveDate,
        target: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<ChallengeRow>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StorageError::from)?;
        tx.execute(
            "UPDATE challenge_progress SET progress = progress + 1
             WHERE user_id = ?1 AND challenge_id = ?2 AND week_start = ?3 AND completed = 0",
            params![user_id, challenge_id, week_start.to_string()],
        )
        .map_err(StorageError::from)?;
        tx.execute(
            "UPDATE challenge_progress SET completed = 1, completed_at = ?4
             WHERE user_id = ?1 AND challenge_id = ?2 AND week_start = ?3
               AND completed = 0 AND progress >= ?5",
            params![
                user_id,
                challenge_id,
                week_start.to_string(),
                now.to_rfc3339(),
                target,
            ],
        )
        .map_err(StorageError::from)?;
        let row = tx
            .query_row(
                "SELECT id, user_id, challenge_id, week_start, progress,
                        completed, completed_at, reward_claimed
                 FROM challenge_progress
                 WHERE user_id = ?1 AND challenge_id = ?2 AND week_start = ?3",
                params![user_id, challenge_id, week_start.to_string()],
                row_to_challenge,
            )
            .optional()
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(row)
    }

    /// Flip `reward_claimed` for a completed, unclaimed row and persist the
    /// credited account in the same transaction, so a claim commits together
    /// with its payout. The guarded UPDATE is the claim's exclusivity: zero
    /// rows affected means either not complete or already claimed, and in
    /// both cases the account write rolls back with it.
    pub fn claim_challenge(&self, id: &str, account: &RewardAccount) -> Result<ChallengeRow> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StorageError::from)?;
        let row = tx
            .query_row(
                "SELECT id, user_id, challenge_id, week_start, progress,
                        completed, completed_at, reward_claimed
                 FROM challenge_progress WHERE id = ?1",
                params![id],
                row_to_challenge,
            )
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| RewardError::UnknownChallenge(id.to_string()))?;

        let updated = tx
            .execute(
                "UPDATE challenge_progress SET reward_claimed = 1
                 WHERE id = ?1 AND completed = 1 AND reward_claimed = 0",
                params![id],
            )
            .map_err(StorageError::from)?;
        if updated == 0 {
            if !row.completed {
                return Err(RewardError::ChallengeNotComplete.into());
            }
            return Err(RewardError::AlreadyClaimed.into());
        }
        tx.execute(
            "UPDATE reward_accounts SET
                coins = ?2, available_spins = ?3, total_spins_used = ?4,
                streak_multiplier = ?5, streak_days = ?6,
                shield_expires_at = ?7, updated_at = ?8
             WHERE user_id = ?1",
            params![
                account.user_id,
                account.coins.max(0),
                account.available_spins.max(0),
                account.total_spins_used,
                account.streak_multiplier,
                account.streak_days,
                account.shield_expires_at.map(|t| t.to_rfc3339()),
                account.updated_at.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(ChallengeRow {
            reward_claimed: true,
            ..row
        })
    }

    // ── Inventory ────────────────────────────────────────────────────

    /// Add or refresh an inventory entry, keeping the later expiry. A NULL
    /// expiry means the item never expires and wins over any dated expiry.
    pub fn grant_item(
        &self,
        user_id: &str,
        item_id: &str,
        category: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO inventory (user_id, item_id, category, expires_at, acquired_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, item_id) DO UPDATE SET
                expires_at = CASE
                    WHEN expires_at IS NULL OR ?4 IS NULL THEN NULL
                    ELSE MAX(expires_at, ?4)
                END,
                category = ?3",
            params![
                user_id,
                item_id,
                category,
                expires_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// Whether the user holds an unexpired copy of `item_id`.
    pub fn has_active_item(
        &self,
        user_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM inventory
                 WHERE user_id = ?1 AND item_id = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
                params![user_id, item_id, now.to_rfc3339()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    /// Equip an item within its cosmetic category; at most one equipped
    /// entry per category.
    pub fn equip_item(&self, user_id: &str, item_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StorageError::from)?;
        let category: Option<String> = tx
            .query_row(
                "SELECT category FROM inventory WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        let Some(category) = category else {
            return Err(EngineError::Custom(format!(
                "item {item_id} not in inventory"
            )));
        };
        tx.execute(
            "UPDATE inventory SET equipped = 0 WHERE user_id = ?1 AND category = ?2",
            params![user_id, category],
        )
        .map_err(StorageError::from)?;
        tx.execute(
            "UPDATE inventory SET equipped = 1 WHERE user_id = ?1 AND item_id = ?2",
            params![user_id, item_id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    pub fn inventory_for(&self, user_id: &str) -> Result<Vec<InventoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, item_id, category, expires_at, equipped, acquired_at
                 FROM inventory WHERE user_id = ?1 ORDER BY acquired_at",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                let expires_at: Option<String> = row.get(3)?;
                let acquired_at: String = row.get(5)?;
                Ok(InventoryEntry {
                    user_id: row.get(0)?,
                    item_id: row.get(1)?,
                    category: row.get(2)?,
                    expires_at: expires_at.as_deref().and_then(|s| {
                        DateTime::parse_from_rfc3339(s)
                            .map(|dt| dt.with_timezone(&Utc))
                            .ok()
                    }),
                    equipped: row.get::<_, i64>(4)? != 0,
                    acquired_at: parse_datetime(5, &acquired_at)?,
                })
            })
            .map_err(StorageError::from)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(StorageError::from)?);
        }
        Ok(items)
    }
}

/// A challenge progress row as stored.
#[derive(Debug, Clone)]
pub struct ChallengeRow {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub week_start: NaiveDate,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_claimed: bool,
}

/// Parse an RFC3339 timestamp stored in column `idx`, surfacing a parse
/// failure as a query error rather than substituting a current time.
fn parse_datetime(idx: usize, dt_str: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<RewardAccount> {
    let shield_expires_at: Option<String> = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(RewardAccount {
        user_id: row.get(0)?,
        coins: row.get(1)?,
        available_spins: row.get(2)?,
        total_spins_used: row.get(3)?,
        streak_multiplier: row.get(4)?,
        streak_days: row.get(5)?,
        shield_expires_at: shield_expires_at.as_deref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        updated_at: parse_datetime(7, &updated_at)?,
    })
}

fn row_to_challenge(row: &rusqlite::Row) -> rusqlite::Result<ChallengeRow> {
    let week_start: String = row.get(3)?;
    let completed_at: Option<String> = row.get(6)?;
    Ok(ChallengeRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        challenge_id: row.get(2)?,
        week_start: week_start.parse().unwrap_or_default(),
        progress: row.get(4)?,
        completed: row.get::<_, i64>(5)? != 0,
        completed_at: completed_at.as_deref().and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        reward_claimed: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::slot::SlotSymbol;

    #[test]
    fn account_create_and_save() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();
        let mut account = store.get_or_create_account("user-1", now).unwrap();
        assert_eq!(account.coins, 0);
        assert_eq!(account.streak_multiplier, 1.0);

        account.coins = 120;
        account.available_spins = 3;
        store.save_account(&account).unwrap();

        let reloaded = store.get_or_create_account("user-1", now).unwrap();
        assert_eq!(reloaded.coins, 120);
        assert_eq!(reloaded.available_spins, 3);
    }

    #[test]
    fn negative_coins_clamp_to_zero() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();
        let mut account = store.get_or_create_account("user-1", now).unwrap();
        account.coins = -50;
        store.save_account(&account).unwrap();
        assert_eq!(store.get_or_create_account("user-1", now).unwrap().coins, 0);
    }

    #[test]
    fn spin_history_recovery_flow() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();
        let record = SpinHistoryRecord {
            id: "spin-1".to_string(),
            user_id: "user-1".to_string(),
            symbols: [SlotSymbol::Pill, SlotSymbol::Pill, SlotSymbol::Pill],
            outcome: SpinOutcome::ThreeOfAKind,
            prize: Prize::Coins { amount: 50 },
            coins_credited: 50,
            applied: false,
            created_at: now,
        };
        store.insert_spin_history(&record).unwrap();
        assert_eq!(store.unapplied_spins().unwrap().len(), 1);

        store.mark_spin_applied("spin-1").unwrap();
        assert!(store.unapplied_spins().unwrap().is_empty());
        assert_eq!(store.spin_history("user-1", 10).unwrap().len(), 1);
    }

    #[test]
    fn badge_insert_is_idempotent() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();
        assert!(store.insert_badge("user-1", "first_dose", now).unwrap());
        assert!(!store.insert_badge("user-1", "first_dose", now).unwrap());
        assert_eq!(store.badge_count("user-1").unwrap(), 1);
    }

    #[test]
    fn challenge_progress_and_claim() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();
        let week = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        store.ensure_challenge_row("user-1", "seven_on_time", week).unwrap();
        store.ensure_challenge_row("user-1", "seven_on_time", week).unwrap();
        assert_eq!(store.challenge_rows("user-1", week).unwrap().len(), 1);

        let mut row = None;
        for _ in 0..3 {
            row = store
                .increment_challenge("user-1", "seven_on_time", week, 3, now)
                .unwrap();
        }
        let row = row.unwrap();
        assert_eq!(row.progress, 3);
        assert!(row.completed);

        // Increments stop once completed.
        let after = store
            .increment_challenge("user-1", "seven_on_time", week, 3, now)
            .unwrap()
            .unwrap();
        assert_eq!(after.progress, 3);

        let mut account = store.get_or_create_account("user-1", now).unwrap();
        account.coins += 100;
        account.available_spins += 1;
        let claimed = store.claim_challenge(&row.id, &account).unwrap();
        assert!(claimed.reward_claimed);

        // The claim flag and the credited balance land in one commit.
        let after = store.get_or_create_account("user-1", now).unwrap();
        assert_eq!(after.coins, 100);
        assert_eq!(after.available_spins, 1);

        account.coins += 100;
        let err = store.claim_challenge(&row.id, &account).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Reward(RewardError::AlreadyClaimed)
        ));
        // A rejected claim rolls the account write back with it.
        let after = store.get_or_create_account("user-1", now).unwrap();
        assert_eq!(after.coins, 100);
    }

    #[test]
    fn claim_requires_completion() {
        let store = RewardStore::open_memory().unwrap();
        let week = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        store.ensure_challenge_row("user-1", "early_three", week).unwrap();
        let account = store.get_or_create_account("user-1", Utc::now()).unwrap();
        let row = &store.challenge_rows("user-1", week).unwrap()[0];
        let err = store.claim_challenge(&row.id, &account).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Reward(RewardError::ChallengeNotComplete)
        ));
    }

    #[test]
    fn inventory_expiry_and_equip() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();

        store
            .grant_item("user-1", "double_coins", "boost", Some(now + chrono::Duration::hours(24)), now)
            .unwrap();
        assert!(store.has_active_item("user-1", "double_coins", now).unwrap());
        assert!(!store
            .has_active_item("user-1", "double_coins", now + chrono::Duration::hours(25))
            .unwrap());

        store.grant_item("user-1", "theme_ocean", "theme", None, now).unwrap();
        store.grant_item("user-1", "theme_forest", "theme", None, now).unwrap();
        store.equip_item("user-1", "theme_ocean").unwrap();
        store.equip_item("user-1", "theme_forest").unwrap();

        let equipped: Vec<_> = store
            .inventory_for("user-1")
            .unwrap()
            .into_iter()
            .filter(|i| i.category == "theme" && i.equipped)
            .collect();
        assert_eq!(equipped.len(), 1);
        assert_eq!(equipped[0].item_id, "theme_forest");
    }

    #[test]
    fn regrant_keeps_permanent_item_permanent() {
        let store = RewardStore::open_memory().unwrap();
        let now = Utc::now();

        // Permanent grant, then a dated re-grant: stays permanent.
        store.grant_item("user-1", "theme_ocean", "theme", None, now).unwrap();
        store
            .grant_item("user-1", "theme_ocean", "theme", Some(now + chrono::Duration::hours(1)), now)
            .unwrap();
        assert!(store
            .has_active_item("user-1", "theme_ocean", now + chrono::Duration::days(365))
            .unwrap());

        // Dated grant, then a permanent re-grant: becomes permanent.
        store
            .grant_item("user-2", "double_coins", "boost", Some(now + chrono::Duration::hours(1)), now)
            .unwrap();
        store.grant_item("user-2", "double_coins", "boost", None, now).unwrap();
        assert!(store
            .has_active_item("user-2", "double_coins", now + chrono::Duration::days(365))
            .unwrap());

        // Two dated grants still keep the later expiry.
        store
            .grant_item("user-3", "double_coins", "boost", Some(now + chrono::Duration::hours(1)), now)
            .unwrap();
        store
            .grant_item("user-3", "double_coins", "boost", Some(now + chrono::Duration::hours(24)), now)
            .unwrap();
        assert!(store
            .has_active_item("user-3", "double_coins", now + chrono::Duration::hours(12))
            .unwrap());
        assert!(!store
            .has_active_item("user-3", "double_coins", now + chrono::Duration::hours(25))
            .unwrap());
    }
}
