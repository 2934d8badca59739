use super::{with_session, ADMIN_ONLY, ANY_ROLE};
use crate::config::{load_section, merge_section_patch, SetupSection};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let mut out = Map::new();
        for section in SetupSection::ALL {
            let v = load_section(ctx.conn, section)
                .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
            out.insert(section.name().to_string(), v);
        }
        Ok(Value::Object(out))
    })
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ADMIN_ONLY, |ctx| {
        let section = req
            .params
            .get("section")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
        let section = SetupSection::parse(section)
            .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
        let patch = req
            .params
            .get("patch")
            .and_then(|v| v.as_object())
            .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

        let mut current = load_section(ctx.conn, section)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
        db::settings_set_json(ctx.conn, section.key(), &current)
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
        tracing::info!(section = section.name(), "settings updated");
        let mut out = json!({ "ok": true });
        out[section.name()] = current;
        Ok(out)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
