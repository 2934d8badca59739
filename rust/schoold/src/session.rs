//! Sessions are created at the login boundary and handed to assemblies by
//! reference. Nothing below the IPC layer looks a session up on its own.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Parent,
    Teacher,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "parent" => Some(Self::Parent),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Parent => "parent",
            Self::Teacher => "teacher",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    /// Parent sessions are bound to one student.
    pub student_id: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, SessionContext>,
}

impl SessionTable {
    pub fn open(&mut self, ctx: SessionContext) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), ctx);
        token
    }

    pub fn get(&self, token: &str) -> Option<&SessionContext> {
        self.sessions.get(token)
    }

    pub fn close(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drops every session; used when the workspace changes underneath them.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

pub fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}
