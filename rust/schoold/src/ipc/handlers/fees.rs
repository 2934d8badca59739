use super::{to_json, with_session, ANY_ROLE};
use crate::assemble::fees::class_fees;
use crate::ipc::types::{AppState, Request};
use serde_json::Value;

fn handle_fees_open(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let class = ctx.class(&req.params)?;
        to_json(&class_fees(&ctx.store, &class)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fees.open" => Some(handle_fees_open(state, req)),
        _ => None,
    }
}
