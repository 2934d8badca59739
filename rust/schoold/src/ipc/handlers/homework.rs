use super::{optional_date, optional_str, required_date, required_str, to_json, with_session, ANY_ROLE, STAFF};
use crate::assemble::homework::{class_homework, create_homework, HomeworkRejected, NewHomework};
use crate::assemble::scope::resolve_teacher;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::normalize::normalize;
use serde_json::{json, Value};

impl From<HomeworkRejected> for HandlerErr {
    fn from(e: HomeworkRejected) -> Self {
        match e {
            HomeworkRejected::Assemble(inner) => inner.into(),
            HomeworkRejected::NotAssigned => Self::new("no_scope", e.to_string()),
            HomeworkRejected::DueBeforeAssigned | HomeworkRejected::EmptyTitle => {
                Self::bad_params(e.to_string())
            }
        }
    }
}

fn handle_homework_list(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, ANY_ROLE, |ctx| {
        let class = ctx.class(&req.params)?;
        let due_from = optional_date(&req.params, "dueFrom")?;
        to_json(&class_homework(&ctx.store, &class, due_from)?)
    })
}

fn handle_homework_create(state: &mut AppState, req: &Request) -> Value {
    with_session(state, req, STAFF, |ctx| {
        let p = &req.params;
        let teacher = resolve_teacher(&ctx.store, ctx.session, optional_str(p, "teacherId")?)?;
        let class = normalize(required_str(p, "classLabel")?, optional_str(p, "section")?)?;
        let hw = NewHomework {
            class,
            subject_id: required_str(p, "subjectId")?.to_string(),
            assigned_date: required_date(p, "assignedDate")?,
            due_date: required_date(p, "dueDate")?,
            title: required_str(p, "title")?.to_string(),
            description: optional_str(p, "description")?.unwrap_or_default().to_string(),
        };
        let id = create_homework(&ctx.store, &teacher, &hw)?;
        tracing::info!(homework = %id, class = %hw.class, "homework created");
        Ok(json!({ "homeworkId": id, "class": hw.class }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "homework.list" => Some(handle_homework_list(state, req)),
        "homework.create" => Some(handle_homework_create(state, req)),
        _ => None,
    }
}
