//! Repository error taxonomy.

use crate::db::codec::CodecError;
use crate::db::DbError;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity family named in repository errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Ensemble,
    Realization,
    Parameter,
    ResponseDefinition,
    Response,
    Observation,
    /// Parameter or response key as listed by the read facade.
    DataKey,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ensemble => "ensemble",
            Self::Realization => "realization",
            Self::Parameter => "parameter",
            Self::ResponseDefinition => "response definition",
            Self::Response => "response",
            Self::Observation => "observation",
            Self::DataKey => "data key",
        })
    }
}

/// Error returned by experiment repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Insert collides with an existing natural key.
    DuplicateKey { entity: EntityKind, key: String },
    /// Natural-key lookup found nothing.
    NotFound { entity: EntityKind, key: String },
    /// Parallel sequences of one entity have inconsistent lengths.
    LengthMismatch {
        entity: EntityKind,
        name: String,
        expected: usize,
        actual: usize,
    },
    /// Constraint violation detected at commit; the staged batch was discarded.
    Integrity(String),
    /// Operation attempted after `close()`.
    Closed,
    Db(DbError),
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { entity, key } => write!(f, "{entity} already exists: {key}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::LengthMismatch {
                entity,
                name,
                expected,
                actual,
            } => write!(
                f,
                "{entity} `{name}` has inconsistent lengths: expected {expected}, got {actual}"
            ),
            Self::Integrity(message) => write!(f, "integrity violation on commit: {message}"),
            Self::Closed => write!(f, "repository is closed"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "experiment repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "experiment repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if constraint_code(&value).is_some() {
            return Self::Integrity(value.to_string());
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<CodecError> for RepoError {
    fn from(value: CodecError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl RepoError {
    /// Returns whether this error is a uniqueness violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Returns whether this error is a failed natural-key lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Maps an insert failure, naming the colliding natural key on uniqueness
/// violations.
pub(crate) fn map_insert_error(err: rusqlite::Error, entity: EntityKind, key: &str) -> RepoError {
    match constraint_code(&err) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
            RepoError::DuplicateKey {
                entity,
                key: key.to_string(),
            }
        }
        _ => RepoError::from(err),
    }
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(inner.extended_code)
        }
        _ => None,
    }
}
