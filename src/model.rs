use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hod,
    Professor,
}

/// Identity and tenant scope handed over by the access gate. Trusted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub tenant_id: String,
    pub caller_id: String,
    pub role: Role,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether `raw` is syntactically an entity identifier. Says nothing about existence.
pub fn is_valid_id(raw: &str) -> bool {
    Uuid::parse_str(raw).is_ok()
}

/// Order-preserving dedup of requested ids.
pub fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub code: i64,
    pub name: String,
    pub division: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub enrollment_number: String,
    pub name: String,
    pub semester: i64,
    pub division: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorRow {
    pub id: String,
    pub name: String,
    pub username: String,
    pub class_ids: Vec<String>,
}
