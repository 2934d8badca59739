//! Handler families. Each exposes `try_handle`, returning `None` for methods
//! it does not own.

pub mod admin;
pub mod attendance;
pub mod auth;
pub mod core;
pub mod exams;
pub mod fees;
pub mod homework;
pub mod marks;
pub mod setup;
pub mod timetable;

use crate::assemble::scope::resolve_class;
use crate::config::SchoolConfig;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::normalize::ClassKey;
use crate::session::{Role, SessionContext};
use crate::store::SqliteStore;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

pub(super) const ANY_ROLE: &[Role] = &[Role::Admin, Role::Parent, Role::Teacher];
pub(super) const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
pub(super) const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// What a session-bound handler body gets to work with.
pub(super) struct Ctx<'a> {
    pub conn: &'a Connection,
    pub store: SqliteStore<'a>,
    pub session: &'a SessionContext,
}

impl Ctx<'_> {
    pub fn config(&self) -> Result<SchoolConfig, HandlerErr> {
        SchoolConfig::load(self.conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
    }

    /// The class a request targets, from `classLabel`/`section` and the session.
    pub fn class(&self, params: &Value) -> Result<ClassKey, HandlerErr> {
        Ok(resolve_class(
            &self.store,
            self.session,
            optional_str(params, "classLabel")?,
            optional_str(params, "section")?,
        )?)
    }
}

/// Runs `f` with the workspace and the caller's session, refusing roles not in
/// `roles`.
pub(super) fn with_session(
    state: &AppState,
    req: &Request,
    roles: &[Role],
    f: impl FnOnce(&Ctx<'_>) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let session = match session_for(state, &req.params) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    if !roles.contains(&session.role) {
        return err(
            &req.id,
            "forbidden",
            format!("{} sessions cannot call {}", session.role.as_str(), req.method),
            None,
        );
    }
    let ctx = Ctx {
        conn,
        store: SqliteStore::new(conn),
        session,
    };
    match f(&ctx) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub(super) fn session_for<'s>(
    state: &'s AppState,
    params: &Value,
) -> Result<&'s SessionContext, HandlerErr> {
    let token = params
        .get("sessionToken")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::new("no_session", "missing sessionToken"))?;
    state
        .sessions
        .get(token)
        .ok_or_else(|| HandlerErr::new("no_session", "session expired or unknown"))
}

pub(super) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`; any other non-string is an error.
pub(super) fn optional_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then_some(s))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub(super) fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(required_str(params, key)?, key)
}

pub(super) fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    optional_str(params, key)?
        .map(|raw| parse_date(raw, key))
        .transpose()
}

pub(super) fn required_u32(params: &Value, key: &str) -> Result<u32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key)))
}

pub(super) fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub(super) fn string_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let arr = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array", key)))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must hold non-empty strings", key)))
        })
        .collect()
}

pub(super) fn to_json<T: serde::Serialize>(v: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("internal", e.to_string()))
}
