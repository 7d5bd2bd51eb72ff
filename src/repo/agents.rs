//! Agent row mapping and scoped finders.

use crate::entity::{draw_short_names, Agent, AgentStatus};
use crate::repo::{parse_rfc3339, parse_rfc3339_opt, to_sql_err};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, game_id, short_name, score, findings_submitted, findings_valid, \
     findings_false, findings_duplicate, disputes_won, disputes_lost, hunt_done_round, \
     review_done_round, status, last_heartbeat, created_at";

pub struct AgentRepo;

impl AgentRepo {
    pub fn create(conn: &Connection, agent: &Agent) -> Result<()> {
        conn.prepare_cached(
            "INSERT INTO agents (id, game_id, short_name, score, findings_submitted,
               findings_valid, findings_false, findings_duplicate, disputes_won, disputes_lost,
               hunt_done_round, review_done_round, status, last_heartbeat, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?
        .execute(params![
            agent.id,
            agent.game_id,
            agent.short_name,
            agent.score,
            agent.findings_submitted,
            agent.findings_valid,
            agent.findings_false,
            agent.findings_duplicate,
            agent.disputes_won,
            agent.disputes_lost,
            agent.hunt_done_round,
            agent.review_done_round,
            agent.status.as_str(),
            agent.last_heartbeat.map(|d| d.to_rfc3339()),
            agent.created_at.to_rfc3339(),
        ])?;
        Ok(())
    }

    /// Create `count` agents with unique shuffled short names.
    pub fn create_many(conn: &Connection, game_id: &str, count: usize) -> Result<Vec<Agent>> {
        let names = draw_short_names(count, &mut rand::thread_rng())?;
        let mut agents = Vec::with_capacity(count);
        for name in names {
            let agent = Agent::new(game_id, &name);
            Self::create(conn, &agent)?;
            agents.push(agent);
        }
        Ok(agents)
    }

    pub fn update(conn: &Connection, agent: &Agent) -> Result<()> {
        conn.prepare_cached(
            "UPDATE agents SET score = ?1, findings_submitted = ?2, findings_valid = ?3,
               findings_false = ?4, findings_duplicate = ?5, disputes_won = ?6,
               disputes_lost = ?7, hunt_done_round = ?8, review_done_round = ?9,
               status = ?10, last_heartbeat = ?11
             WHERE id = ?12",
        )?
        .execute(params![
            agent.score,
            agent.findings_submitted,
            agent.findings_valid,
            agent.findings_false,
            agent.findings_duplicate,
            agent.disputes_won,
            agent.disputes_lost,
            agent.hunt_done_round,
            agent.review_done_round,
            agent.status.as_str(),
            agent.last_heartbeat.map(|d| d.to_rfc3339()),
            agent.id,
        ])?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Agent>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM agents WHERE id = ?1", COLUMNS))?;
        let row = stmt.query_row([id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn find_by_game_id(conn: &Connection, game_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM agents WHERE game_id = ?1 ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);

        result
    }

    pub fn find_active(conn: &Connection, game_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM agents WHERE game_id = ?1 AND status = 'active' ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);

        result
    }

    /// Agents ranked by score, ties broken by valid-finding count.
    pub fn scoreboard(conn: &Connection, game_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM agents WHERE game_id = ?1
             ORDER BY score DESC, findings_valid DESC, id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);

        result
    }

    /// Active agents that have not signalled hunt completion for `round`.
    pub fn get_pending_hunt_agents(
        conn: &Connection,
        game_id: &str,
        round: u32,
    ) -> Result<Vec<Agent>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM agents
             WHERE game_id = ?1 AND status = 'active' AND hunt_done_round < ?2
             ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, round], Self::from_row)?);

        result
    }

    /// Active agents that have not signalled review completion for `round`.
    pub fn get_pending_review_agents(
        conn: &Connection,
        game_id: &str,
        round: u32,
    ) -> Result<Vec<Agent>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM agents
             WHERE game_id = ?1 AND status = 'active' AND review_done_round < ?2
             ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, round], Self::from_row)?);

        result
    }

    fn collect(rows: impl Iterator<Item = rusqlite::Result<Agent>>) -> Result<Vec<Agent>> {
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
        let status: String = row.get(12)?;
        let heartbeat: Option<String> = row.get(13)?;
        let created_at: String = row.get(14)?;
        Ok(Agent {
            id: row.get(0)?,
            game_id: row.get(1)?,
            short_name: row.get(2)?,
            score: row.get(3)?,
            findings_submitted: row.get(4)?,
            findings_valid: row.get(5)?,
            findings_false: row.get(6)?,
            findings_duplicate: row.get(7)?,
            disputes_won: row.get(8)?,
            disputes_lost: row.get(9)?,
            hunt_done_round: row.get(10)?,
            review_done_round: row.get(11)?,
            status: AgentStatus::from_str(&status).map_err(to_sql_err)?,
            last_heartbeat: parse_rfc3339_opt(heartbeat).map_err(to_sql_err)?,
            created_at: parse_rfc3339(&created_at).map_err(to_sql_err)?,
        })
    }
}
