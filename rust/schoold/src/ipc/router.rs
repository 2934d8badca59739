use super::generation::ViewStamp;
use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::{err, HandlerErr};
use serde_json::json;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    let stamp = match ViewStamp::from_params(&req.params) {
        Ok(s) => s,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if let Some(stamp) = &stamp {
        if let Err(latest) = state.generations.admit(stamp) {
            tracing::debug!(view = %stamp.key, generation = stamp.generation, latest, "stale request");
            return HandlerErr::new("stale_request", "a newer request for this view was already handled")
                .with_details(json!({
                    "viewKey": stamp.key,
                    "generation": stamp.generation,
                    "latest": latest,
                }))
                .response(&req.id);
        }
    }

    let mut resp = dispatch(state, &req);
    if let Some(stamp) = stamp {
        resp["generation"] = json!(stamp.generation);
    }
    resp
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::admin::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::exams::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::marks::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::fees::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::homework::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
