//! Postgres persistence
//!
//! One `PgRepository` implements every repository trait the engine uses.
//! Status and enum columns hold the upper-case names of the domain enums.

mod build;
mod deployment;
mod project;

use cfforge_engine::error::RepositoryError;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> RepositoryError {
    RepositoryError::backend(err)
}

/// Parses an enum column, reporting the offending record on failure
fn parse_column<T>(value: &str, record: uuid::Uuid) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepositoryError::InvalidRecord(format!("{}: {}", record, e)))
}
