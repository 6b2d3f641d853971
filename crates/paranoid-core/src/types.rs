//! Column types.

/// SQL type of a column, as rendered in DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    BigInt,
    Double,
    Boolean,
    VarChar(u32),
    Text,
    Blob,
    Timestamp,
    /// Used for `deleted_at`.
    TimestampTz,
    Json,
}

impl SqlType {
    pub fn sql_name(&self) -> String {
        let name = match self {
            SqlType::VarChar(len) => return format!("VARCHAR({len})"),
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMPTZ",
            SqlType::Json => "JSON",
        };
        name.to_string()
    }
}
