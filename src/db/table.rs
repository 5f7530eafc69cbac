use anyhow::{Result, anyhow};
use serde::Serialize;
use std::fmt;

/// Qualified name of a destination table.
///
/// Rendered into SQL exactly as given; identifiers are not quoted or case
/// folded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// A table resolved against the session's current schema
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Parse `schema.table` or a bare `table`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').map(str::trim).collect();

        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::unqualified(*name)),
            [schema, name] if !schema.is_empty() && !name.is_empty() => {
                Ok(Self::new(*schema, *name))
            }
            _ => Err(anyhow!(
                "Invalid table name '{}'. Expected format: 'schema.table' or 'table'",
                s
            )),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}
