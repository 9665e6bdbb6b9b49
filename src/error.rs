use crate::db::schema::{IMMUTABLE_PREFIX, SCHEMA};
use sqlx::Error as SqlxError;
use sqlx::error::ErrorKind;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum WordleError {
    #[error("duplicate value for unique column {table}.{column}")]
    UniquenessViolation { table: String, column: String },

    #[error("row in {table} references a missing parent")]
    ReferentialViolation { table: String },

    #[error("missing required value for {table}.{column}")]
    NotNullViolation { table: String, column: String },

    #[error("value too long for {table}.{column}")]
    LengthViolation { table: String, column: String },

    #[error("{table}.{column} cannot be changed after insert")]
    ImmutableColumn { table: String, column: String },

    #[error("no row with id {id} in {table}")]
    NotFound { table: String, id: i64 },

    #[error("table {table} has no relation {relation}")]
    UnknownRelation { table: String, relation: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Database error: {0}")]
    DatabaseError(SqlxError),

    #[error("Config error: {0}")]
    Config(#[from] figment::Error),
}

impl WordleError {
    pub fn is_uniqueness_violation(&self) -> bool {
        matches!(self, Self::UniquenessViolation { .. })
    }

    pub fn is_referential_violation(&self) -> bool {
        matches!(self, Self::ReferentialViolation { .. })
    }

    pub fn is_not_null_violation(&self) -> bool {
        matches!(self, Self::NotNullViolation { .. })
    }

    pub fn not_found(table: &str, id: i64) -> Self {
        Self::NotFound {
            table: table.to_string(),
            id,
        }
    }

    /// Fill in the table for constraint failures whose engine message does
    /// not name one (SQLite reports foreign-key failures without context).
    pub fn in_table(self, name: &str) -> Self {
        match self {
            Self::ReferentialViolation { table } if table.is_empty() => {
                Self::ReferentialViolation {
                    table: name.to_string(),
                }
            }
            other => other,
        }
    }
}

impl From<SqlxError> for WordleError {
    fn from(e: SqlxError) -> Self {
        let Some(db_err) = e.as_database_error() else {
            return Self::DatabaseError(e);
        };
        let message = db_err.message();
        match db_err.kind() {
            ErrorKind::UniqueViolation => {
                let (table, column) = split_qualified(message);
                Self::UniquenessViolation { table, column }
            }
            ErrorKind::NotNullViolation => {
                let (table, column) = split_qualified(message);
                Self::NotNullViolation { table, column }
            }
            ErrorKind::ForeignKeyViolation => Self::ReferentialViolation {
                table: String::new(),
            },
            ErrorKind::CheckViolation => match length_constraint(message) {
                Some((table, column)) => Self::LengthViolation {
                    table: table.to_string(),
                    column: column.to_string(),
                },
                None => Self::DatabaseError(e),
            },
            _ => match message.strip_prefix(IMMUTABLE_PREFIX) {
                Some(target) => {
                    let (table, column) = split_qualified(target);
                    Self::ImmutableColumn { table, column }
                }
                None => Self::DatabaseError(e),
            },
        }
    }
}

/// `"UNIQUE constraint failed: games.active_chat"` -> `("games", "active_chat")`
fn split_qualified(message: &str) -> (String, String) {
    let target = message.rsplit(": ").next().unwrap_or(message);
    // composite constraints list several columns; the first one names the table
    let first = target.split(", ").next().unwrap_or(target);
    match first.split_once('.') {
        Some((table, column)) => (table.to_string(), column.to_string()),
        None => (String::new(), first.to_string()),
    }
}

/// Map a failed CHECK constraint name back to the bounded column.
fn length_constraint(message: &str) -> Option<(&'static str, &'static str)> {
    let name = message.rsplit(": ").next()?;
    SCHEMA.iter().find_map(|t| {
        t.columns
            .iter()
            .filter(|c| c.max_length().is_some())
            .find(|c| c.length_constraint_name(t.name) == name)
            .map(|c| (t.name, c.name))
    })
}
