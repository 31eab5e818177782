//! Repository utilities.

use diesel::result::DatabaseErrorInformation;
use diesel::sql_types::BigInt;
use diesel::QueryableByName;

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Serialize a value into a JSON TEXT column.
pub fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, diesel::result::Error> {
    serde_json::to_string(value).map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))
}

/// Parse a JSON TEXT column, falling back to the type's default.
pub fn from_json_text<T: serde::de::DeserializeOwned + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

#[derive(QueryableByName)]
pub(crate) struct LastInsertRowId {
    #[diesel(sql_type = BigInt, column_name = "last_insert_rowid()")]
    pub id: i64,
}
