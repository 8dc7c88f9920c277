use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "CREATE",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(ChangeOperation::Create),
            "UPDATE" => Ok(ChangeOperation::Update),
            "DELETE" => Ok(ChangeOperation::Delete),
            other => Err(format!("invalid change operation: {other}")),
        }
    }
}

/// ChangeLog はマスタレコードの変更履歴 1 件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLog {
    pub id: Uuid,
    pub master: String,
    pub record_id: Uuid,
    pub operation: ChangeOperation,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

impl ChangeLog {
    pub fn new(
        master: &str,
        record_id: Uuid,
        operation: ChangeOperation,
        before: Option<Value>,
        after: Option<Value>,
        changed_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            master: master.to_string(),
            record_id,
            operation,
            before,
            after,
            changed_by: changed_by.to_string(),
            changed_at: Utc::now(),
        }
    }
}
