use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use super::generation::GenerationTracker;
use crate::session::SessionTable;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub sessions: SessionTable,
    pub generations: GenerationTracker,
}
