use super::{optional_str, to_json, with_session, Ctx, ANY_ROLE};
use crate::assemble::scope::resolve_teacher;
use crate::assemble::timetable::{class_timetable, teacher_timetable};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use serde_json::{json, Value};

/// Teachers without a `classLabel` and admins with a `teacherId` get a
/// teacher grid; everything else is a class grid.
fn timetable_open(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let cfg = ctx.config()?;
    let teacher_id = optional_str(params, "teacherId")?;
    let wants_teacher = match ctx.session.role {
        Role::Teacher => optional_str(params, "classLabel")?.is_none(),
        Role::Admin => teacher_id.is_some(),
        Role::Parent => false,
    };
    if wants_teacher {
        let teacher = resolve_teacher(&ctx.store, ctx.session, teacher_id)?;
        let view = teacher_timetable(&ctx.store, &cfg, &teacher)?;
        return Ok(json!({
            "kind": "teacher",
            "teacherId": teacher.teacher.id,
            "teacherName": teacher.teacher.full_name,
            "timetable": to_json(&view)?,
        }));
    }
    let class = ctx.class(params)?;
    let view = class_timetable(&ctx.store, &cfg, &class)?;
    Ok(json!({
        "kind": "class",
        "class": class,
        "timetable": to_json(&view)?,
    }))
}

fn handle_timetable_open(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| timetable_open(ctx, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "timetable.open" => Some(handle_timetable_open(state, req)),
        _ => None,
    }
}
