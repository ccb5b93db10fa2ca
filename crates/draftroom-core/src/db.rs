// SQLite persistence layer for draft sessions.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::draft::budget::TeamBudget;
use crate::draft::pick::{DraftMode, DraftPick, DraftStatus};
use crate::draft::session::{DraftSession, DraftSettings};
use crate::draft::turn::DrafterSlot;
use crate::store::{DraftStore, PickCommit, PickRevert, RosterEntry, StoreError, StoredDraft};

/// SQLite-backed [`DraftStore`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS draft_sessions (
                id            TEXT PRIMARY KEY,
                league_id     TEXT NOT NULL,
                season        INTEGER NOT NULL,
                mode          TEXT NOT NULL,
                status        TEXT NOT NULL,
                current_pick  INTEGER NOT NULL,
                current_round INTEGER NOT NULL,
                settings      TEXT NOT NULL,
                scheduled_for TEXT,
                start_time    TEXT,
                end_time      TEXT,
                last_pick_at  TEXT,
                version       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS draft_teams (
                draft_id  TEXT NOT NULL REFERENCES draft_sessions(id),
                seq       INTEGER NOT NULL,
                team_id   TEXT NOT NULL,
                team_name TEXT NOT NULL,
                PRIMARY KEY (draft_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS drafter_slots (
                draft_id TEXT NOT NULL REFERENCES draft_sessions(id),
                position INTEGER NOT NULL,
                team_id  TEXT NOT NULL,
                PRIMARY KEY (draft_id, position)
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                draft_id     TEXT NOT NULL REFERENCES draft_sessions(id),
                pick_number  INTEGER NOT NULL,
                round        INTEGER NOT NULL,
                team_id      TEXT NOT NULL,
                player_id    TEXT NOT NULL,
                amount       INTEGER,
                is_auto_pick INTEGER NOT NULL DEFAULT 0,
                tag          TEXT,
                picked_at    TEXT NOT NULL,
                PRIMARY KEY (draft_id, pick_number),
                UNIQUE (draft_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS roster_entries (
                draft_id  TEXT NOT NULL REFERENCES draft_sessions(id),
                team_id   TEXT NOT NULL,
                player_id TEXT NOT NULL,
                position  TEXT NOT NULL,
                slot      TEXT NOT NULL,
                price     INTEGER,
                PRIMARY KEY (draft_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS team_budgets (
                team_id           TEXT NOT NULL,
                season            INTEGER NOT NULL,
                total_budget      INTEGER NOT NULL,
                spent             INTEGER NOT NULL,
                remaining         INTEGER NOT NULL,
                spent_by_position TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (team_id, season)
            );

            CREATE INDEX IF NOT EXISTS idx_draft_sessions_status ON draft_sessions(status);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection lock.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Number of committed picks (keepers included) for a draft.
    pub fn pick_count(&self, draft_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM draft_picks WHERE draft_id = ?1",
                params![draft_id],
                |row| row.get(0),
            )
            .context("failed to count draft picks")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Row helpers
    // ------------------------------------------------------------------

    /// Write the session's mutable columns, guarded by `expected_version`.
    fn write_session_row(
        tx: &Transaction<'_>,
        session: &DraftSession,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let updated = tx
            .execute(
                "UPDATE draft_sessions SET
                    status = ?1, current_pick = ?2, current_round = ?3,
                    scheduled_for = ?4, start_time = ?5, end_time = ?6,
                    last_pick_at = ?7, version = ?8
                 WHERE id = ?9 AND version = ?10",
                params![
                    session.status.as_str(),
                    session.current_pick,
                    session.current_round,
                    ts(session.scheduled_for),
                    ts(session.start_time),
                    ts(session.end_time),
                    ts(session.last_pick_at),
                    session.version as i64,
                    session.id,
                    expected_version as i64,
                ],
            )
            .context("failed to update draft session")?;
        if updated == 0 {
            return Err(StoreError::Conflict {
                draft_id: session.id.clone(),
            });
        }
        Ok(())
    }

    fn write_drafter_slots(tx: &Transaction<'_>, session: &DraftSession) -> Result<()> {
        tx.execute(
            "DELETE FROM drafter_slots WHERE draft_id = ?1",
            params![session.id],
        )
        .context("failed to clear drafter slots")?;
        for slot in &session.order {
            tx.execute(
                "INSERT INTO drafter_slots (draft_id, position, team_id) VALUES (?1, ?2, ?3)",
                params![session.id, slot.position, slot.team_id],
            )
            .context("failed to insert drafter slot")?;
        }
        Ok(())
    }

    fn spent_by_position_json(budget: &TeamBudget) -> Result<String> {
        serde_json::to_string(&budget.spent_by_position)
            .context("failed to serialize spent_by_position")
    }

    fn load_stored(conn: &Connection, draft_id: &str) -> Result<Option<StoredDraft>> {
        let header = conn
            .query_row(
                "SELECT league_id, season, status, current_pick, current_round, settings,
                        scheduled_for, start_time, end_time, last_pick_at, version
                 FROM draft_sessions WHERE id = ?1",
                params![draft_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, String>(5)?,
                        [
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, Option<String>>(7)?,
                            row.get::<_, Option<String>>(8)?,
                            row.get::<_, Option<String>>(9)?,
                        ],
                        row.get::<_, i64>(10)?,
                    ))
                },
            )
            .optional()
            .context("failed to query draft session")?;

        let Some((league_id, season, status, current_pick, current_round, settings, times, version)) =
            header
        else {
            return Ok(None);
        };

        let status = DraftStatus::from_str_status(&status)
            .with_context(|| format!("unknown draft status {status:?}"))?;
        let settings: DraftSettings =
            serde_json::from_str(&settings).context("failed to deserialize draft settings")?;
        let [scheduled_for, start_time, end_time, last_pick_at] = times;

        let teams = conn
            .prepare("SELECT team_id, team_name FROM draft_teams WHERE draft_id = ?1 ORDER BY seq")
            .context("failed to prepare draft teams query")?
            .query_map(params![draft_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("failed to query draft teams")?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()
            .context("failed to map draft team rows")?;

        let order = conn
            .prepare(
                "SELECT position, team_id FROM drafter_slots WHERE draft_id = ?1 ORDER BY position",
            )
            .context("failed to prepare drafter slots query")?
            .query_map(params![draft_id], |row| {
                Ok(DrafterSlot {
                    position: row.get(0)?,
                    team_id: row.get(1)?,
                })
            })
            .context("failed to query drafter slots")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map drafter slot rows")?;

        let pick_rows = conn
            .prepare(
                "SELECT pick_number, round, team_id, player_id, amount, is_auto_pick, tag, picked_at
                 FROM draft_picks WHERE draft_id = ?1 ORDER BY rowid",
            )
            .context("failed to prepare load picks query")?
            .query_map(params![draft_id], |row| {
                Ok((
                    DraftPick {
                        pick_number: row.get(0)?,
                        round: row.get(1)?,
                        team_id: row.get(2)?,
                        player_id: row.get(3)?,
                        amount: row.get(4)?,
                        is_auto_pick: row.get(5)?,
                        tag: row.get(6)?,
                        picked_at: DateTime::<Utc>::MIN_UTC,
                    },
                    row.get::<_, String>(7)?,
                ))
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;
        let picks = pick_rows
            .into_iter()
            .map(|(mut pick, picked_at)| {
                pick.picked_at = parse_ts(&picked_at)?;
                Ok(pick)
            })
            .collect::<Result<Vec<_>>>()?;

        let roster_entries = conn
            .prepare(
                "SELECT team_id, player_id, position, slot, price
                 FROM roster_entries WHERE draft_id = ?1 ORDER BY rowid",
            )
            .context("failed to prepare roster entries query")?
            .query_map(params![draft_id], |row| {
                Ok(RosterEntry {
                    team_id: row.get(0)?,
                    player_id: row.get(1)?,
                    position: row.get(2)?,
                    slot: row.get(3)?,
                    price: row.get(4)?,
                })
            })
            .context("failed to query roster entries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map roster entry rows")?;

        let budgets = if settings.mode == DraftMode::Auction {
            let rows = conn
                .prepare(
                    "SELECT b.team_id, b.total_budget, b.spent, b.remaining, b.spent_by_position
                     FROM team_budgets b
                     JOIN draft_teams t ON t.team_id = b.team_id
                     WHERE t.draft_id = ?1 AND b.season = ?2
                     ORDER BY t.seq",
                )
                .context("failed to prepare team budgets query")?
                .query_map(params![draft_id, season], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .context("failed to query team budgets")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map team budget rows")?;
            rows.into_iter()
                .map(|(team_id, total_budget, spent, remaining, by_pos)| {
                    Ok(TeamBudget {
                        team_id,
                        season,
                        total_budget,
                        spent,
                        remaining,
                        spent_by_position: serde_json::from_str(&by_pos)
                            .context("failed to deserialize spent_by_position")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Some(StoredDraft {
            id: draft_id.to_string(),
            league_id,
            season,
            settings,
            status,
            current_pick,
            current_round,
            scheduled_for: scheduled_for.as_deref().map(parse_ts).transpose()?,
            start_time: start_time.as_deref().map(parse_ts).transpose()?,
            end_time: end_time.as_deref().map(parse_ts).transpose()?,
            last_pick_at: last_pick_at.as_deref().map(parse_ts).transpose()?,
            version: version as u64,
            teams,
            order,
            picks,
            roster_entries,
            budgets,
        }))
    }
}

fn ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp {value:?}"))
}

impl DraftStore for Database {
    fn insert_draft(&self, session: &DraftSession) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        let settings =
            serde_json::to_string(&session.settings).context("failed to serialize settings")?;
        tx.execute(
            "INSERT INTO draft_sessions
                (id, league_id, season, mode, status, current_pick, current_round, settings,
                 scheduled_for, start_time, end_time, last_pick_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                session.id,
                session.league_id,
                session.season,
                session.settings.mode.as_str(),
                session.status.as_str(),
                session.current_pick,
                session.current_round,
                settings,
                ts(session.scheduled_for),
                ts(session.start_time),
                ts(session.end_time),
                ts(session.last_pick_at),
                session.version as i64,
            ],
        )
        .with_context(|| format!("failed to insert draft {}", session.id))?;

        for (seq, team) in session.teams.iter().enumerate() {
            tx.execute(
                "INSERT INTO draft_teams (draft_id, seq, team_id, team_name) VALUES (?1, ?2, ?3, ?4)",
                params![session.id, seq as i64, team.team_id, team.team_name],
            )
            .context("failed to insert draft team")?;

            if let Some(budget) = &team.budget {
                // A new draft for the season starts every budget over.
                tx.execute(
                    "INSERT OR REPLACE INTO team_budgets
                        (team_id, season, total_budget, spent, remaining, spent_by_position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        budget.team_id,
                        budget.season,
                        budget.total_budget,
                        budget.spent,
                        budget.remaining,
                        Self::spent_by_position_json(budget)?,
                    ],
                )
                .context("failed to insert team budget")?;
            }
        }
        Self::write_drafter_slots(&tx, session)?;

        tx.commit().context("failed to commit insert_draft")?;
        Ok(())
    }

    fn update_draft(&self, session: &DraftSession, expected_version: u64) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        Self::write_session_row(&tx, session, expected_version)?;
        Self::write_drafter_slots(&tx, session)?;
        tx.commit().context("failed to commit update_draft")?;
        Ok(())
    }

    fn commit_pick(&self, commit: &PickCommit<'_>) -> Result<(), StoreError> {
        let session = commit.session;
        let pick = commit.pick;
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        Self::write_session_row(&tx, session, commit.expected_version)?;

        tx.execute(
            "INSERT INTO draft_picks
                (draft_id, pick_number, round, team_id, player_id, amount, is_auto_pick, tag, picked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                pick.pick_number,
                pick.round,
                pick.team_id,
                pick.player_id,
                pick.amount,
                pick.is_auto_pick,
                pick.tag,
                pick.picked_at.to_rfc3339(),
            ],
        )
        .context("failed to record draft pick")?;

        tx.execute(
            "INSERT INTO roster_entries (draft_id, team_id, player_id, position, slot, price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                pick.team_id,
                pick.player_id,
                commit.position,
                commit.slot,
                pick.amount,
            ],
        )
        .context("failed to record roster entry")?;

        let budget = session
            .team(&pick.team_id)
            .and_then(|t| t.budget.as_ref());
        if let (Some(amount), Some(budget)) = (pick.amount, budget) {
            let debited = tx
                .execute(
                    "UPDATE team_budgets SET
                        spent = spent + ?1,
                        remaining = remaining - ?1,
                        spent_by_position = ?2
                     WHERE team_id = ?3 AND season = ?4 AND remaining >= ?1",
                    params![
                        amount,
                        Self::spent_by_position_json(budget)?,
                        budget.team_id,
                        budget.season,
                    ],
                )
                .context("failed to debit team budget")?;
            if debited == 0 {
                return Err(StoreError::Conflict {
                    draft_id: session.id.clone(),
                });
            }
        }

        tx.commit().context("failed to commit pick")?;
        Ok(())
    }

    fn revert_pick(&self, revert: &PickRevert<'_>) -> Result<(), StoreError> {
        let session = revert.session;
        let pick = revert.pick;
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;

        Self::write_session_row(&tx, session, revert.expected_version)?;

        tx.execute(
            "DELETE FROM draft_picks WHERE draft_id = ?1 AND pick_number = ?2",
            params![session.id, pick.pick_number],
        )
        .context("failed to delete draft pick")?;
        tx.execute(
            "DELETE FROM roster_entries WHERE draft_id = ?1 AND player_id = ?2",
            params![session.id, pick.player_id],
        )
        .context("failed to delete roster entry")?;

        let budget = session
            .team(&pick.team_id)
            .and_then(|t| t.budget.as_ref());
        if let (Some(amount), Some(budget)) = (pick.amount, budget) {
            let credited = tx
                .execute(
                    "UPDATE team_budgets SET
                        spent = spent - ?1,
                        remaining = remaining + ?1,
                        spent_by_position = ?2
                     WHERE team_id = ?3 AND season = ?4 AND spent >= ?1",
                    params![
                        amount,
                        Self::spent_by_position_json(budget)?,
                        budget.team_id,
                        budget.season,
                    ],
                )
                .context("failed to credit team budget")?;
            if credited == 0 {
                return Err(StoreError::Conflict {
                    draft_id: session.id.clone(),
                });
            }
        }

        tx.commit().context("failed to commit undo")?;
        Ok(())
    }

    fn load_draft(&self, draft_id: &str) -> Result<Option<DraftSession>, StoreError> {
        let conn = self.conn();
        let stored = Self::load_stored(&conn, draft_id)?;
        Ok(stored.map(DraftSession::restore))
    }

    fn active_draft_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let ids = conn
            .prepare(
                "SELECT id FROM draft_sessions WHERE status IN ('IN_PROGRESS', 'PAUSED') ORDER BY id",
            )
            .context("failed to prepare active drafts query")?
            .query_map([], |row| row.get(0))
            .context("failed to query active drafts")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map active draft rows")?;
        Ok(ids)
    }
}
