//! Prompt assembly: pure functions from game state to markdown.

use crate::entity::{Agent, Dispute, Finding, Game, HuntCategory};

fn category_brief(category: HuntCategory) -> &'static str {
    match category {
        HuntCategory::Bugs => "genuine defects: logic errors, crashes, data corruption, races",
        HuntCategory::DocDrift => {
            "places where documentation contradicts what the code actually does"
        }
        HuntCategory::Security => "exploitable weaknesses: injection, authz gaps, unsafe handling",
        HuntCategory::TestCoverage => "meaningful behavior with no test exercising it",
        HuntCategory::TechDebt => "structural problems that make the code risky to change",
        HuntCategory::Custom => "issues matching the focus instructions below",
    }
}

/// Prompt for one hunter at hunt start.
pub fn hunt_prompt(game: &Game, agent: &Agent) -> String {
    let mut prompt = format!(
        "# Hunt round {round}\n\n\
         You are agent `{name}` competing in a code-review tournament on `{project}`.\n\
         Hunt for {brief}.\n\n",
        round = game.round,
        name = agent.short_name,
        project = game.config.project,
        brief = category_brief(game.config.category),
    );
    if let Some(focus) = &game.config.focus {
        prompt.push_str(&format!("Focus: {}\n\n", focus));
    }
    prompt.push_str(&format!(
        "## Rules\n\
         - Submit each issue with `submit` (file path, inclusive line range, description).\n\
         - Valid finding: +1. False flag: -2. Duplicate of an earlier finding: -3.\n\
         - First to {target} points wins. You have {secs} seconds this round.\n\
         - Call `done` when you have nothing more to submit.\n",
        target = game.config.target_score,
        secs = game.config.hunt_duration_secs,
    ));
    if game.config.category == HuntCategory::DocDrift {
        prompt.push_str(
            "- Every submission must carry a snippet in DOC/CODE/CONTRADICTION format: \
             the documented claim, the actual code, and the contradiction between them.\n",
        );
    }
    prompt
}

/// Prompt for the referee adjudicating one pending finding.
pub fn referee_finding_prompt(game: &Game, finding: &Finding) -> String {
    let mut prompt = format!(
        "# Referee: adjudicate finding {id}\n\n\
         Project: `{project}`  Category: {category}\n\n\
         Agent `{agent}` reports in `{file}` lines {start}-{end}:\n\n\
         > {desc}\n\n",
        id = finding.id,
        project = game.config.project,
        category = game.config.category,
        agent = finding.agent_id,
        file = finding.file_path,
        start = finding.line_start,
        end = finding.line_end,
        desc = finding.description,
    );
    if let Some(snippet) = &finding.code_snippet {
        prompt.push_str(&format!("Evidence:\n```\n{}\n```\n\n", snippet));
    }
    prompt.push_str(
        "Read the referenced code, then record exactly one verdict with `validate`:\n\
         - VALID if the issue is real (flag it for verification if you are unsure)\n\
         - FALSE if the report is wrong or overstated\n\
         - DUPLICATE with the original finding id if it restates an earlier valid finding\n",
    );
    prompt
}

/// Prompt for the verifier second-checking an uncertain validation.
pub fn verifier_prompt(game: &Game, finding: &Finding) -> String {
    let mut prompt = format!(
        "# Verifier: second-check finding {id}\n\n\
         Project: `{project}`\n\
         The referee marked this valid but uncertain",
        id = finding.id,
        project = game.config.project,
    );
    if let Some(verdict) = &finding.verdict {
        prompt.push_str(&format!(": \"{}\"", verdict));
    }
    prompt.push_str(&format!(
        "\n\n`{file}` lines {start}-{end}:\n\n> {desc}\n\n\
         Independently confirm or reject. Confirmation awards the finder's point;\n\
         rejection overrides the referee and penalizes the finder.\n",
        file = finding.file_path,
        start = finding.line_start,
        end = finding.line_end,
        desc = finding.description,
    ));
    prompt
}

/// Prompt for one reviewer at review start, listing disputable findings.
pub fn review_prompt(game: &Game, agent: &Agent, reviewable: &[Finding]) -> String {
    let mut prompt = format!(
        "# Review round {round}\n\n\
         You are agent `{name}`. The findings below were validated this game.\n\
         Dispute any you believe are wrong: a won dispute earns +2 and revokes the\n\
         finding; a lost dispute costs -1. You have {secs} seconds.\n\n",
        round = game.round,
        name = agent.short_name,
        secs = game.config.review_duration_secs,
    );
    if reviewable.is_empty() {
        prompt.push_str("No findings are open for dispute. Call `done`.\n");
        return prompt;
    }
    for finding in reviewable {
        prompt.push_str(&format!(
            "- Finding {id} by `{agent}`: `{file}` lines {start}-{end} - {desc}\n",
            id = finding.id,
            agent = finding.agent_id,
            file = finding.file_path,
            start = finding.line_start,
            end = finding.line_end,
            desc = finding.description,
        ));
    }
    prompt.push_str("\nFile disputes with `dispute`, then call `done`.\n");
    prompt
}

/// Prompt for the referee resolving one dispute.
pub fn referee_dispute_prompt(game: &Game, dispute: &Dispute, finding: &Finding) -> String {
    format!(
        "# Referee: resolve dispute {id}\n\n\
         Project: `{project}`\n\n\
         Finding {fid} (`{file}` lines {start}-{end}, by `{finder}`):\n\n> {desc}\n\n\
         Agent `{disputer}` disputes it:\n\n> {reason}\n\n\
         Record exactly one verdict with `resolve`:\n\
         - SUCCESSFUL if the dispute is right and the finding should be revoked\n\
         - FAILED if the finding stands\n",
        id = dispute.id,
        project = game.config.project,
        fid = finding.id,
        file = finding.file_path,
        start = finding.line_start,
        end = finding.line_end,
        finder = finding.agent_id,
        desc = finding.description,
        disputer = dispute.disputer_id,
        reason = dispute.reason,
    )
}
