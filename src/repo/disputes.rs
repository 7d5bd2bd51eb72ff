//! Dispute row mapping and finders.

use crate::entity::{Dispute, DisputeStatus};
use crate::repo::{parse_rfc3339, parse_rfc3339_opt, to_sql_err};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, game_id, finding_id, disputer_id, round, reason, status, verdict, \
     points_awarded, created_at, resolved_at";

pub struct DisputeRepo;

impl DisputeRepo {
    /// Assigns and returns the new id.
    pub fn create(conn: &Connection, dispute: &mut Dispute) -> Result<i64> {
        conn.prepare_cached(
            "INSERT INTO disputes (game_id, finding_id, disputer_id, round, reason, status,
               verdict, points_awarded, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?
        .execute(params![
            dispute.game_id,
            dispute.finding_id,
            dispute.disputer_id,
            dispute.round,
            dispute.reason,
            dispute.status.as_str(),
            dispute.verdict,
            dispute.points_awarded,
            dispute.created_at.to_rfc3339(),
            dispute.resolved_at.map(|d| d.to_rfc3339()),
        ])?;
        dispute.id = conn.last_insert_rowid();
        Ok(dispute.id)
    }

    pub fn update(conn: &Connection, dispute: &Dispute) -> Result<()> {
        conn.prepare_cached(
            "UPDATE disputes SET status = ?1, verdict = ?2, points_awarded = ?3, resolved_at = ?4
             WHERE id = ?5",
        )?
        .execute(params![
            dispute.status.as_str(),
            dispute.verdict,
            dispute.points_awarded,
            dispute.resolved_at.map(|d| d.to_rfc3339()),
            dispute.id,
        ])?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Dispute>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM disputes WHERE id = ?1", COLUMNS))?;
        let row = stmt.query_row([id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn find_by_game(conn: &Connection, game_id: &str) -> Result<Vec<Dispute>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM disputes WHERE game_id = ?1 ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);

        result
    }

    /// Disputes awaiting referee resolution for a round, filing order.
    pub fn find_pending_by_round(
        conn: &Connection,
        game_id: &str,
        round: u32,
    ) -> Result<Vec<Dispute>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM disputes
             WHERE game_id = ?1 AND round = ?2 AND status = 'pending' ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, round], Self::from_row)?);

        result
    }

    /// Whether an agent has already disputed a finding, in any status.
    pub fn has_agent_disputed(conn: &Connection, finding_id: i64, agent_id: &str) -> Result<bool> {
        let count: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM disputes WHERE finding_id = ?1 AND disputer_id = ?2",
            )?
            .query_row(params![finding_id, agent_id], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn collect(rows: impl Iterator<Item = rusqlite::Result<Dispute>>) -> Result<Vec<Dispute>> {
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Dispute> {
        let status: String = row.get(6)?;
        let created_at: String = row.get(9)?;
        let resolved_at: Option<String> = row.get(10)?;
        Ok(Dispute {
            id: row.get(0)?,
            game_id: row.get(1)?,
            finding_id: row.get(2)?,
            disputer_id: row.get(3)?,
            round: row.get(4)?,
            reason: row.get(5)?,
            status: DisputeStatus::from_str(&status).map_err(to_sql_err)?,
            verdict: row.get(7)?,
            points_awarded: row.get(8)?,
            created_at: parse_rfc3339(&created_at).map_err(to_sql_err)?,
            resolved_at: parse_rfc3339_opt(resolved_at).map_err(to_sql_err)?,
        })
    }
}
