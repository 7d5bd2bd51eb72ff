//! Finding row mapping and the duplicate-detection finders.

use crate::entity::{Confidence, Finding, FindingStatus, VerificationStatus};
use crate::repo::{parse_rfc3339, parse_rfc3339_opt, to_sql_err};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, game_id, agent_id, round, file_path, line_start, line_end, \
     description, code_snippet, pattern_hash, status, duplicate_of, verdict, confidence, \
     confidence_score, points_awarded, verification_status, verifier_explanation, issue_type, \
     impact_tier, rejection_reason, created_at, validated_at";

pub struct FindingRepo;

impl FindingRepo {
    /// Insert the finding and bump the submitting agent's counter in the
    /// same statement batch. Callers wanting atomicity run this inside a
    /// store transaction. Assigns and returns the new id.
    pub fn create(conn: &Connection, finding: &mut Finding) -> Result<i64> {
        conn.prepare_cached(
            "INSERT INTO findings (game_id, agent_id, round, file_path, line_start, line_end,
               description, code_snippet, pattern_hash, status, duplicate_of, verdict,
               confidence, confidence_score, points_awarded, verification_status,
               verifier_explanation, issue_type, impact_tier, rejection_reason, created_at,
               validated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
               ?17, ?18, ?19, ?20, ?21, ?22)",
        )?
        .execute(params![
            finding.game_id,
            finding.agent_id,
            finding.round,
            finding.file_path,
            finding.line_start,
            finding.line_end,
            finding.description,
            finding.code_snippet,
            finding.pattern_hash,
            finding.status.as_str(),
            finding.duplicate_of,
            finding.verdict,
            finding.confidence.map(|c| c.as_str()),
            finding.confidence_score,
            finding.points_awarded,
            finding.verification_status.as_str(),
            finding.verifier_explanation,
            finding.issue_type,
            finding.impact_tier,
            finding.rejection_reason,
            finding.created_at.to_rfc3339(),
            finding.validated_at.map(|d| d.to_rfc3339()),
        ])?;
        finding.id = conn.last_insert_rowid();
        conn.prepare_cached(
            "UPDATE agents SET findings_submitted = findings_submitted + 1 WHERE id = ?1",
        )?
        .execute([&finding.agent_id])?;
        Ok(finding.id)
    }

    pub fn update(conn: &Connection, finding: &Finding) -> Result<()> {
        conn.prepare_cached(
            "UPDATE findings SET status = ?1, duplicate_of = ?2, verdict = ?3, confidence = ?4,
               confidence_score = ?5, points_awarded = ?6, verification_status = ?7,
               verifier_explanation = ?8, issue_type = ?9, impact_tier = ?10,
               rejection_reason = ?11, validated_at = ?12
             WHERE id = ?13",
        )?
        .execute(params![
            finding.status.as_str(),
            finding.duplicate_of,
            finding.verdict,
            finding.confidence.map(|c| c.as_str()),
            finding.confidence_score,
            finding.points_awarded,
            finding.verification_status.as_str(),
            finding.verifier_explanation,
            finding.issue_type,
            finding.impact_tier,
            finding.rejection_reason,
            finding.validated_at.map(|d| d.to_rfc3339()),
            finding.id,
        ])?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Finding>> {
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {} FROM findings WHERE id = ?1", COLUMNS))?;
        let row = stmt.query_row([id], Self::from_row).optional()?;
        Ok(row)
    }

    pub fn find_by_game(conn: &Connection, game_id: &str) -> Result<Vec<Finding>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM findings WHERE game_id = ?1 ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);
        result
    }

    /// Findings awaiting referee adjudication for a round, submission order.
    pub fn find_pending_by_round(
        conn: &Connection,
        game_id: &str,
        round: u32,
    ) -> Result<Vec<Finding>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM findings
             WHERE game_id = ?1 AND round = ?2 AND status = 'pending' ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, round], Self::from_row)?);
        result
    }

    pub fn find_valid(conn: &Connection, game_id: &str) -> Result<Vec<Finding>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM findings WHERE game_id = ?1 AND status = 'valid' ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map([game_id], Self::from_row)?);
        result
    }

    /// Valid findings the referee marked for second-pass verification.
    pub fn find_pending_verification_by_round(
        conn: &Connection,
        game_id: &str,
        round: u32,
    ) -> Result<Vec<Finding>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM findings
             WHERE game_id = ?1 AND round = ?2 AND verification_status = 'pending' ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, round], Self::from_row)?);
        result
    }

    /// Findings sharing a pattern hash. With `valid_only` the match set is
    /// {valid}; otherwise {valid, pending}, which is what referee-time
    /// duplicate detection needs.
    pub fn find_by_pattern_hash(
        conn: &Connection,
        game_id: &str,
        pattern_hash: &str,
        valid_only: bool,
    ) -> Result<Vec<Finding>> {
        let sql = if valid_only {
            format!(
                "SELECT {} FROM findings
                 WHERE game_id = ?1 AND pattern_hash = ?2 AND status = 'valid' ORDER BY id",
                COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM findings
                 WHERE game_id = ?1 AND pattern_hash = ?2 AND status IN ('valid', 'pending')
                 ORDER BY id",
                COLUMNS
            )
        };
        let mut stmt = conn.prepare_cached(&sql)?;
        let result = Self::collect(stmt.query_map(params![game_id, pattern_hash], Self::from_row)?);
        result
    }

    /// Valid findings an agent may dispute: not their own, and not parked
    /// behind an unresolved verification.
    pub fn find_reviewable_for_agent(
        conn: &Connection,
        game_id: &str,
        agent_id: &str,
    ) -> Result<Vec<Finding>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM findings
             WHERE game_id = ?1 AND status = 'valid' AND agent_id != ?2
               AND verification_status != 'pending'
             ORDER BY id",
            COLUMNS
        ))?;
        let result = Self::collect(stmt.query_map(params![game_id, agent_id], Self::from_row)?);
        result
    }

    pub fn count_by_status(
        conn: &Connection,
        game_id: &str,
        status: FindingStatus,
    ) -> Result<i64> {
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM findings WHERE game_id = ?1 AND status = ?2")?
            .query_row(params![game_id, status.as_str()], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_by_round(conn: &Connection, game_id: &str, round: u32) -> Result<i64> {
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM findings WHERE game_id = ?1 AND round = ?2")?
            .query_row(params![game_id, round], |row| row.get(0))?;
        Ok(count)
    }

    fn collect(rows: impl Iterator<Item = rusqlite::Result<Finding>>) -> Result<Vec<Finding>> {
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Finding> {
        let status: String = row.get(10)?;
        let confidence: Option<String> = row.get(13)?;
        let verification: String = row.get(16)?;
        let created_at: String = row.get(21)?;
        let validated_at: Option<String> = row.get(22)?;
        Ok(Finding {
            id: row.get(0)?,
            game_id: row.get(1)?,
            agent_id: row.get(2)?,
            round: row.get(3)?,
            file_path: row.get(4)?,
            line_start: row.get(5)?,
            line_end: row.get(6)?,
            description: row.get(7)?,
            code_snippet: row.get(8)?,
            pattern_hash: row.get(9)?,
            status: FindingStatus::from_str(&status).map_err(to_sql_err)?,
            duplicate_of: row.get(11)?,
            verdict: row.get(12)?,
            confidence: confidence
                .map(|c| Confidence::from_str(&c))
                .transpose()
                .map_err(to_sql_err)?,
            confidence_score: row.get(14)?,
            points_awarded: row.get(15)?,
            verification_status: VerificationStatus::from_str(&verification).map_err(to_sql_err)?,
            verifier_explanation: row.get(17)?,
            issue_type: row.get(18)?,
            impact_tier: row.get(19)?,
            rejection_reason: row.get(20)?,
            created_at: parse_rfc3339(&created_at).map_err(to_sql_err)?,
            validated_at: parse_rfc3339_opt(validated_at).map_err(to_sql_err)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::entity::{Agent, Game};
    use crate::repo::{AgentRepo, GameRepo};
    use crate::store::Store;

    fn seed(conn: &Connection) -> (Game, Agent, Agent) {
        let game = Game::new(GameConfig::new("proj"));
        GameRepo::create(conn, &game).unwrap();
        let a = Agent::new(&game.id, "ada");
        let b = Agent::new(&game.id, "basil");
        AgentRepo::create(conn, &a).unwrap();
        AgentRepo::create(conn, &b).unwrap();
        (game, a, b)
    }

    fn new_finding(game: &Game, agent: &Agent, hash: &str) -> Finding {
        Finding::new(
            &game.id,
            &agent.id,
            1,
            "src/lib.rs",
            10,
            20,
            "dangling reference in cache",
            None,
            hash.to_string(),
        )
    }

    #[test]
    fn create_assigns_id_and_bumps_submitted_counter() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let (game, a, _) = seed(conn);
                let mut finding = new_finding(&game, &a, "aaaa");
                let id = FindingRepo::create(conn, &mut finding)?;
                assert!(id > 0);
                assert_eq!(finding.id, id);
                let agent = AgentRepo::find_by_id(conn, &a.id)?.unwrap();
                assert_eq!(agent.findings_submitted, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn pattern_hash_match_sets_differ_by_valid_only() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let (game, a, b) = seed(conn);
                let mut valid = new_finding(&game, &a, "dead");
                valid
                    .validate("ok", Confidence::High, None, None, None, false)
                    .unwrap();
                FindingRepo::create(conn, &mut valid)?;
                let mut pending = new_finding(&game, &b, "dead");
                FindingRepo::create(conn, &mut pending)?;

                let strict = FindingRepo::find_by_pattern_hash(conn, &game.id, "dead", true)?;
                assert_eq!(strict.len(), 1);
                let loose = FindingRepo::find_by_pattern_hash(conn, &game.id, "dead", false)?;
                assert_eq!(loose.len(), 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reviewable_excludes_own_and_verification_pending() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let (game, a, b) = seed(conn);
                let mut own = new_finding(&game, &a, "a1");
                own.validate("ok", Confidence::High, None, None, None, false)
                    .unwrap();
                FindingRepo::create(conn, &mut own)?;
                let mut theirs = new_finding(&game, &b, "b1");
                theirs
                    .validate("ok", Confidence::High, None, None, None, false)
                    .unwrap();
                FindingRepo::create(conn, &mut theirs)?;
                let mut unverified = new_finding(&game, &b, "b2");
                unverified
                    .validate("unsure", Confidence::Low, None, None, None, true)
                    .unwrap();
                FindingRepo::create(conn, &mut unverified)?;

                let reviewable = FindingRepo::find_reviewable_for_agent(conn, &game.id, &a.id)?;
                assert_eq!(reviewable.len(), 1);
                assert_eq!(reviewable[0].agent_id, b.id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn finding_row_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                let (game, a, _) = seed(conn);
                let mut f = new_finding(&game, &a, "beef");
                f.code_snippet = Some("let x = y;".to_string());
                f.validate("solid", Confidence::Medium, Some(70), Some("bug".into()), None, false)
                    .unwrap();
                FindingRepo::create(conn, &mut f)?;
                let loaded = FindingRepo::find_by_id(conn, f.id)?.unwrap();
                assert_eq!(loaded.status, FindingStatus::Valid);
                assert_eq!(loaded.confidence, Some(Confidence::Medium));
                assert_eq!(loaded.confidence_score, Some(70));
                assert_eq!(loaded.issue_type.as_deref(), Some("bug"));
                assert_eq!(loaded.points_awarded, 1);
                assert!(loaded.validated_at.is_some());
                Ok(())
            })
            .unwrap();
    }
}
