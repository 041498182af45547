use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// SQL dialect spoken by a target instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Sqlserver,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Sqlserver => "sqlserver",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::Mysql),
            "sqlserver" | "sql server" => Ok(Dialect::Sqlserver),
            other => Err(TypeError::unknown("dialect", other)),
        }
    }
}

/// Reference to a registered target database instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: u64,
    pub name: String,
    pub dialect: Dialect,
}

impl InstanceRef {
    pub fn new(id: u64, name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            id,
            name: name.into(),
            dialect,
        }
    }
}
