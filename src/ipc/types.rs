use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::schedule::model::AuthContext;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub context: Option<AuthContext>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
