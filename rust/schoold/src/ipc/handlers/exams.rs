use super::{string_list, to_json, with_session, ANY_ROLE};
use crate::assemble::exams::{exam_timetable, exams_for_grade, exams_shared_by};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use serde_json::{json, Value};

fn handle_exams_open(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let class = ctx.class(&req.params)?;
        to_json(&exam_timetable(&ctx.store, &class)?)
    })
}

/// Exam definitions for the caller's grade, or with `sharedBy` the exams
/// every listed class label sits.
fn handle_exams_list(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        if req.params.get("sharedBy").is_some() {
            if ctx.session.role == Role::Parent {
                return Err(HandlerErr::new("forbidden", "parents list their own grade only"));
            }
            let labels = string_list(&req.params, "sharedBy")?;
            let exams = exams_shared_by(&ctx.store, &labels)?;
            return Ok(json!({ "exams": to_json(&exams)? }));
        }
        let class = ctx.class(&req.params)?;
        let exams = exams_for_grade(&ctx.store, class.grade)?;
        Ok(json!({ "grade": class.grade, "exams": to_json(&exams)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "exams.open" => Some(handle_exams_open(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        _ => None,
    }
}
