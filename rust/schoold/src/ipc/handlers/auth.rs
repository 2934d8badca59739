use super::{required_str, session_for};
use crate::assemble::rows::UserRow;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::row;
use crate::session::{password_digest, Role, SessionContext};
use crate::store::{fetch, fetch_one, DataStore, Filter, Select, SqliteStore};
use serde_json::json;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

pub(super) fn check_password(password: &str) -> Result<(), HandlerErr> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerErr::bad_params(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Creates the first admin account. Refused once any user exists.
fn bootstrap(store: &dyn DataStore, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(params, "username")?;
    let password = required_str(params, "password")?;
    check_password(password)?;
    let existing: Vec<UserRow> = fetch(store, Select::from("users"))?;
    if !existing.is_empty() {
        return Err(HandlerErr::new("forbidden", "users already exist; log in as an admin"));
    }
    let id = Uuid::new_v4().to_string();
    store.insert(
        "users",
        &[row! {
            "id" => id,
            "username" => username,
            "password_sha256" => password_digest(password),
            "role" => Role::Admin.as_str(),
        }],
    )?;
    tracing::info!(%username, "admin account bootstrapped");
    Ok(json!({ "userId": id }))
}

fn login(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let username = required_str(params, "username")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;

    let store = SqliteStore::new(conn);
    let user: Option<UserRow> = fetch_one(
        &store,
        Select::from("users").filter(Filter::Eq("username", username.into())),
    )?;
    let Some(user) = user.filter(|u| u.password_sha256 == password_digest(password)) else {
        tracing::info!(%username, "login refused");
        return Err(HandlerErr::new("bad_credentials", "unknown user or wrong password"));
    };
    let Some(role) = Role::parse(&user.role) else {
        tracing::warn!(user = %user.id, role = %user.role, "user has an unknown role");
        return Err(HandlerErr::new("bad_credentials", "account role is not recognized"));
    };

    let ctx = SessionContext {
        user_id: user.id,
        username: user.username,
        role,
        student_id: user.student_id,
        teacher_id: user.teacher_id,
    };
    let session = serde_json::to_value(&ctx).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    let token = state.sessions.open(ctx);
    tracing::info!(%username, role = role.as_str(), "session opened");
    Ok(json!({ "sessionToken": token, "session": session }))
}

fn handle_bootstrap(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match bootstrap(&SqliteStore::new(conn), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    match login(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(token) = req.params.get("sessionToken").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionToken", None);
    };
    let closed = state.sessions.close(token);
    ok(&req.id, json!({ "closed": closed }))
}

fn handle_session_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_for(state, &req.params) {
        Ok(session) => ok(&req.id, json!({ "session": session })),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.bootstrap" => Some(handle_bootstrap(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "session.get" => Some(handle_session_get(state, req)),
        _ => None,
    }
}
