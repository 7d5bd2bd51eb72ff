//! Repositories: map entities to persisted rows, with intention-revealing
//! finders. All functions take a `&Connection` so the same query works
//! inside and outside a [`crate::store::Store::transaction`].

mod agents;
mod disputes;
mod findings;
mod games;

pub use agents::AgentRepo;
pub use disputes::DisputeRepo;
pub use findings::FindingRepo;
pub use games::GameRepo;

use crate::{BonesError, Result};
use chrono::{DateTime, Utc};

pub(crate) fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BonesError::State(format!("invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_rfc3339_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_rfc3339(&v)).transpose()
}

pub(crate) fn to_sql_err(err: BonesError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}
