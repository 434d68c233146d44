use thiserror::Error;

/// Postgres SQLSTATE for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    /// Any failed read. Callers only ever learn that loading failed.
    #[error("failed to load {what}")]
    Load {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to save {what}")]
    Save {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("a join request for this group is already pending")]
    AlreadyRequested,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("local store error: {0}")]
    Storage(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl AppError {
    pub fn load(what: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| AppError::Load { what, source }
    }

    pub fn save(what: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| AppError::Save { what, source }
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_hide_the_backend_detail() {
        let err = AppError::load("schedules")(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), "failed to load schedules");
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }
}
