pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database operation timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Edit conflict on record {id}, version {version} is no longer current")]
    EditConflict { id: i64, version: i64 },

    #[error("Invalid order by field: {0}")]
    InvalidOrderByField(String),
}

impl Error {
    /// Failures of the database layer itself, as opposed to domain outcomes.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::DatabaseError(_) | Error::MigrationError(_) | Error::Timeout(_))
    }
}
