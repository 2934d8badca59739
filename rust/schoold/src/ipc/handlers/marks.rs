use super::{optional_f64, optional_str, required_str, to_json, with_session, Ctx, ANY_ROLE, STAFF};
use crate::assemble::marks::{marks_roster, report_card, submit_marks, MarkSubmission};
use crate::assemble::scope::{resolve_student, resolve_teacher};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::normalize::ClassKey;
use crate::session::Role;
use serde_json::Value;

/// The class, exam and subject a marks request targets. Teachers must teach
/// the subject to that class.
fn marks_target<'p>(ctx: &Ctx<'_>, params: &'p Value) -> Result<(ClassKey, &'p str, &'p str), HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let subject_id = required_str(params, "subjectId")?;
    let class = ctx.class(params)?;
    if ctx.session.role == Role::Teacher {
        let teacher = resolve_teacher(&ctx.store, ctx.session, None)?;
        if !teacher.teaches(subject_id, &class) {
            return Err(HandlerErr::new(
                "no_scope",
                format!("not assigned to teach {} to {}", subject_id, class),
            ));
        }
    }
    Ok((class, exam_id, subject_id))
}

fn parse_entries(params: &Value) -> Result<Vec<MarkSubmission>, HandlerErr> {
    let arr = params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("entries must be an array"))?;
    arr.iter()
        .map(|e| {
            Ok(MarkSubmission {
                student_id: required_str(e, "studentId")?.to_string(),
                marks_obtained: optional_f64(e, "marksObtained")?,
                total_marks: optional_f64(e, "totalMarks")?,
                absent: e.get("absent").and_then(|v| v.as_bool()).unwrap_or(false),
                remarks: optional_str(e, "remarks")?.map(String::from),
            })
        })
        .collect()
}

fn handle_marks_roster(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, STAFF, |ctx| {
        let cfg = ctx.config()?;
        let (class, exam_id, subject_id) = marks_target(ctx, &req.params)?;
        to_json(&marks_roster(&ctx.store, &cfg, exam_id, subject_id, &class)?)
    })
}

fn handle_marks_submit(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, STAFF, |ctx| {
        let cfg = ctx.config()?;
        let (class, exam_id, subject_id) = marks_target(ctx, &req.params)?;
        let entries = parse_entries(&req.params)?;
        to_json(&submit_marks(&ctx.store, &cfg, exam_id, subject_id, &class, &entries)?)
    })
}

fn handle_marks_report_card(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let cfg = ctx.config()?;
        let student = resolve_student(&ctx.store, ctx.session, optional_str(&req.params, "studentId")?)?;
        if ctx.session.role == Role::Teacher {
            let teacher = resolve_teacher(&ctx.store, ctx.session, None)?;
            if !teacher.teaches_class(&student.class) {
                return Err(HandlerErr::new("no_scope", "student is outside the teacher's classes"));
            }
        }
        to_json(&report_card(&ctx.store, &cfg, &student)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "marks.roster" => Some(handle_marks_roster(state, req)),
        "marks.submit" => Some(handle_marks_submit(state, req)),
        "marks.reportCard" => Some(handle_marks_report_card(state, req)),
        _ => None,
    }
}
