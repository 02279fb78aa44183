//! Resource and scheduler configuration

use crate::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Key type of a configured table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyType {
    /// UTF-8 string keys
    String,
    /// 32-bit signed integer keys
    Integer,
    /// 64-bit signed integer keys
    Long,
    /// 64-bit float keys
    Double,
    /// 32-bit float keys
    Float,
}

impl KeyType {
    /// Canonical name
    pub const fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "String",
            KeyType::Integer => "Integer",
            KeyType::Long => "Long",
            KeyType::Double => "Double",
            KeyType::Float => "Float",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(KeyType::String),
            "integer" | "int" => Ok(KeyType::Integer),
            "long" => Ok(KeyType::Long),
            "double" => Ok(KeyType::Double),
            "float" => Ok(KeyType::Float),
            _ => Err(SchedulerError::UnknownKeyType(s.to_string())),
        }
    }
}

impl TryFrom<String> for KeyType {
    type Error = SchedulerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyType> for String {
    fn from(key_type: KeyType) -> Self {
        key_type.as_str().to_string()
    }
}

/// One table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Table name
    #[serde(rename = "tableName")]
    pub table_name: String,
    /// Key type of the table
    #[serde(rename = "type")]
    pub key_type: KeyType,
}

impl ResourceConfig {
    /// Create a table definition
    pub fn new(table_name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            table_name: table_name.into(),
            key_type,
        }
    }
}

/// Parse a JSON array of table definitions
pub fn parse_resources(json: &str) -> SchedulerResult<Vec<ResourceConfig>> {
    Ok(serde_json::from_str(json)?)
}

/// Read a JSON array of table definitions from a file
pub fn load_resources(path: impl AsRef<Path>) -> SchedulerResult<Vec<ResourceConfig>> {
    let content = std::fs::read_to_string(path)?;
    parse_resources(&content)
}

/// Stage capacities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Capacity of the unallocated queue
    #[serde(default = "default_capacity")]
    pub unallocated_capacity: usize,
    /// Maximum number of parked transactions
    #[serde(default = "default_capacity")]
    pub allocated_capacity: usize,
    /// Capacity of the ready queue
    #[serde(default = "default_capacity")]
    pub ready_capacity: usize,
}

fn default_capacity() -> usize {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unallocated_capacity: default_capacity(),
            allocated_capacity: default_capacity(),
            ready_capacity: default_capacity(),
        }
    }
}
