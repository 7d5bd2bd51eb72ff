//! Game row mapping and finders.

use crate::config::GameConfig;
use crate::entity::{Game, GamePhase, HuntCategory};
use crate::repo::{parse_rfc3339, parse_rfc3339_opt, to_sql_err};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, project, category, focus, target_score, hunt_duration_secs, \
     review_duration_secs, num_agents, max_rounds, phase, round, phase_deadline, \
     winner_agent_id, created_at, completed_at";

pub struct GameRepo;

impl GameRepo {
    pub fn create(conn: &Connection, game: &Game) -> Result<()> {
        conn.prepare_cached(
            "INSERT INTO games (id, project, category, focus, target_score, hunt_duration_secs,
               review_duration_secs, num_agents, max_rounds, phase, round, phase_deadline,
               winner_agent_id, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?
        .execute(params![
            game.id,
            game.config.project,
            game.config.category.as_str(),
            game.config.focus,
            game.config.target_score,
            game.config.hunt_duration_secs,
            game.config.review_duration_secs,
            game.config.num_agents as i64,
            game.config.max_rounds,
            game.phase.as_str(),
            game.round,
            game.phase_deadline.map(|d| d.to_rfc3339()),
            game.winner_agent_id,
            game.created_at.to_rfc3339(),
            game.completed_at.map(|d| d.to_rfc3339()),
        ])?;
        Ok(())
    }

    /// Persist mutable state; config columns never change after creation.
    pub fn update(conn: &Connection, game: &Game) -> Result<()> {
        conn.prepare_cached(
            "UPDATE games SET phase = ?1, round = ?2, phase_deadline = ?3,
               winner_agent_id = ?4, completed_at = ?5
             WHERE id = ?6",
        )?
        .execute(params![
            game.phase.as_str(),
            game.round,
            game.phase_deadline.map(|d| d.to_rfc3339()),
            game.winner_agent_id,
            game.completed_at.map(|d| d.to_rfc3339()),
            game.id,
        ])?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Game>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM games WHERE id = ?1", COLUMNS))?;
        let row = stmt.query_row([id], Self::from_row).optional()?;
        Ok(row)
    }

    /// All games, newest first.
    pub fn find_all(conn: &Connection) -> Result<Vec<Game>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM games ORDER BY created_at DESC",
            COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent unfinished game for a project, if any.
    pub fn find_active_by_project(conn: &Connection, project: &str) -> Result<Option<Game>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM games WHERE project = ?1 AND phase != 'complete'
             ORDER BY created_at DESC LIMIT 1",
            COLUMNS
        ))?;
        let row = stmt.query_row([project], Self::from_row).optional()?;
        Ok(row)
    }

    /// Cascade-deletes the game's agents, findings, and disputes.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let affected = conn
            .prepare_cached("DELETE FROM games WHERE id = ?1")?
            .execute([id])?;
        Ok(affected > 0)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
        let category: String = row.get(2)?;
        let phase: String = row.get(9)?;
        let deadline: Option<String> = row.get(11)?;
        let created_at: String = row.get(13)?;
        let completed_at: Option<String> = row.get(14)?;
        Ok(Game {
            id: row.get(0)?,
            config: GameConfig {
                project: row.get(1)?,
                category: HuntCategory::from_str(&category).map_err(to_sql_err)?,
                focus: row.get(3)?,
                target_score: row.get(4)?,
                hunt_duration_secs: row.get(5)?,
                review_duration_secs: row.get(6)?,
                num_agents: row.get::<_, i64>(7)? as usize,
                max_rounds: row.get(8)?,
            },
            phase: GamePhase::from_str(&phase).map_err(to_sql_err)?,
            round: row.get(10)?,
            phase_deadline: parse_rfc3339_opt(deadline).map_err(to_sql_err)?,
            winner_agent_id: row.get(12)?,
            created_at: parse_rfc3339(&created_at).map_err(to_sql_err)?,
            completed_at: parse_rfc3339_opt(completed_at).map_err(to_sql_err)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn round_trips_nullable_timestamps() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let mut game = Game::new(GameConfig::new("proj-x"));
                game.config.focus = Some("auth paths".to_string());
                GameRepo::create(conn, &game)?;

                let loaded = GameRepo::find_by_id(conn, &game.id)?.unwrap();
                assert_eq!(loaded.config.project, "proj-x");
                assert_eq!(loaded.config.focus.as_deref(), Some("auth paths"));
                assert_eq!(loaded.phase, GamePhase::Setup);
                assert!(loaded.phase_deadline.is_none());
                assert!(loaded.completed_at.is_none());

                let mut updated = loaded.clone();
                updated.begin_hunt(chrono::Utc::now())?;
                GameRepo::update(conn, &updated)?;
                let reloaded = GameRepo::find_by_id(conn, &game.id)?.unwrap();
                assert_eq!(reloaded.round, 1);
                assert!(reloaded.phase_deadline.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn active_by_project_skips_completed() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let game = Game::new(GameConfig::new("proj-y"));
                GameRepo::create(conn, &game)?;
                assert!(GameRepo::find_active_by_project(conn, "proj-y")?.is_some());
                conn.execute("UPDATE games SET phase = 'complete' WHERE id = ?1", [&game.id])?;
                assert!(GameRepo::find_active_by_project(conn, "proj-y")?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
