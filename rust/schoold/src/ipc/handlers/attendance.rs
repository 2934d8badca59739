use super::{
    optional_date, optional_str, required_date, required_str, required_u32, to_json, with_session,
    ANY_ROLE, STAFF,
};
use crate::assemble::attendance::{mark_attendance, student_attendance, AttendanceMark, AttendanceStatus};
use crate::assemble::scope::{resolve_student, resolve_teacher};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize;
use crate::session::Role;
use serde_json::Value;

fn parse_records(params: &Value) -> Result<Vec<AttendanceMark>, HandlerErr> {
    let arr = params
        .get("records")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("records must be an array"))?;
    arr.iter()
        .map(|r| {
            let raw = required_str(r, "status")?;
            let status = AttendanceStatus::parse(raw)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown attendance status: {}", raw)))?;
            Ok(AttendanceMark {
                student_id: required_str(r, "studentId")?.to_string(),
                status,
            })
        })
        .collect()
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let p = &req.params;
        let cfg = ctx.config()?;
        let student = resolve_student(&ctx.store, ctx.session, optional_str(p, "studentId")?)?;
        if ctx.session.role == Role::Teacher {
            let teacher = resolve_teacher(&ctx.store, ctx.session, None)?;
            if !teacher.teaches_class(&student.class) {
                return Err(HandlerErr::new("no_scope", "student is outside the teacher's classes"));
            }
        }
        let from = optional_date(p, "from")?;
        let to = optional_date(p, "to")?;
        if let (Some(f), Some(t)) = (from, to) {
            if t < f {
                return Err(HandlerErr::bad_params("to is before from"));
            }
        }
        to_json(&student_attendance(&ctx.store, &cfg, &student, from, to)?)
    })
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, STAFF, |ctx| {
        let p = &req.params;
        let cfg = ctx.config()?;
        let teacher = resolve_teacher(&ctx.store, ctx.session, optional_str(p, "teacherId")?)?;
        let class = normalize(required_str(p, "classLabel")?, optional_str(p, "section")?)?;
        let subject_id = required_str(p, "subjectId")?;
        let date = required_date(p, "date")?;
        let period = required_u32(p, "period")?;
        if !(1..=cfg.periods_per_day).contains(&period) {
            return Err(HandlerErr::bad_params(format!(
                "period must be in 1..={}",
                cfg.periods_per_day
            )));
        }
        let records = parse_records(p)?;
        let outcome = mark_attendance(&ctx.store, &teacher, &class, subject_id, date, period, &records)?;
        tracing::info!(
            class = %class,
            subject = %subject_id,
            %date,
            period,
            recorded = outcome.recorded,
            updated = outcome.updated,
            "attendance marked"
        );
        to_json(&outcome)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.summary" => Some(handle_attendance_summary(state, req)),
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        _ => None,
    }
}
