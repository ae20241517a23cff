use std::path::PathBuf;

use crate::config::Settings;
use crate::model::Caller;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Set by the access gate in front of the sidecar; absent for `health` and
    /// `workspace.select`.
    #[serde(default)]
    pub caller: Option<Caller>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            workspace: None,
            db: None,
            settings,
        }
    }
}
