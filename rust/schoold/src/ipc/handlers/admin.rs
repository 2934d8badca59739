//! Admin-only writes that set up the school's records.

use super::auth::check_password;
use super::{
    optional_date, optional_f64, optional_str, required_date, required_str, required_u32,
    string_list, with_session, Ctx, ADMIN_ONLY,
};
use crate::config::canonical_day;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::normalize::{normalize, ClassKey};
use crate::row;
use crate::session::{password_digest, Role};
use crate::store::{fetch, DataStore, Filter, Select};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Rows that carry a class label, for matching an existing record by
/// normalized class.
#[derive(Deserialize)]
struct LabelledRow {
    id: String,
    class_name: String,
    #[serde(default)]
    section: Option<String>,
}

fn any_row(store: &dyn DataStore, table: &'static str, filter: Filter) -> Result<bool, HandlerErr> {
    let rows = store.select(&Select::from(table).columns(&["id"]).filter(filter))?;
    Ok(!rows.is_empty())
}

fn require_exists(store: &dyn DataStore, table: &'static str, key: &str, id: &str) -> Result<(), HandlerErr> {
    if any_row(store, table, Filter::Eq("id", id.into()))? {
        Ok(())
    } else {
        Err(HandlerErr::bad_params(format!("unknown {}: {}", key, id)))
    }
}

fn class_of(label: &str, section: Option<&str>) -> Result<ClassKey, HandlerErr> {
    Ok(normalize(label, section)?)
}

fn find_by_class(rows: Vec<LabelledRow>, key: &ClassKey) -> Option<String> {
    rows.into_iter()
        .find(|r| normalize(&r.class_name, r.section.as_deref()).is_ok_and(|k| &k == key))
        .map(|r| r.id)
}

fn users_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let username = required_str(params, "username")?;
    let password = required_str(params, "password")?;
    check_password(password)?;
    let role = Role::parse(required_str(params, "role")?)
        .ok_or_else(|| HandlerErr::bad_params("role must be admin, parent or teacher"))?;
    let student_id = optional_str(params, "studentId")?;
    let teacher_id = optional_str(params, "teacherId")?;
    match role {
        Role::Parent => {
            let sid = student_id.ok_or_else(|| HandlerErr::bad_params("parent accounts need studentId"))?;
            require_exists(&ctx.store, "students", "studentId", sid)?;
        }
        Role::Teacher => {
            let tid = teacher_id.ok_or_else(|| HandlerErr::bad_params("teacher accounts need teacherId"))?;
            require_exists(&ctx.store, "teachers", "teacherId", tid)?;
        }
        Role::Admin => {}
    }

    if any_row(&ctx.store, "users", Filter::Eq("username", username.into()))? {
        return Err(HandlerErr::new("conflict", format!("username {} is taken", username)));
    }

    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "users",
        &[row! {
            "id" => id,
            "username" => username,
            "password_sha256" => password_digest(password),
            "role" => role.as_str(),
            "student_id" => student_id.filter(|_| role == Role::Parent),
            "teacher_id" => teacher_id.filter(|_| role == Role::Teacher),
        }],
    )?;
    tracing::info!(%username, role = role.as_str(), "user created");
    Ok(json!({ "userId": id }))
}

fn students_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let full_name = required_str(params, "fullName")?;
    let class_name = required_str(params, "className")?;
    let section = optional_str(params, "section")?;
    // Stored as entered; only refused when it would never match a class.
    let class = class_of(class_name, section)?;
    let roll_no = match params.get("rollNo") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| HandlerErr::bad_params("rollNo must be a non-negative integer"))?,
    };
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "students",
        &[row! {
            "id" => id,
            "full_name" => full_name,
            "class_name" => class_name,
            "section" => section,
            "roll_no" => roll_no,
            "academic_year" => optional_str(params, "academicYear")?,
            "active" => true,
        }],
    )?;
    Ok(json!({ "studentId": id, "class": class }))
}

fn teachers_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let full_name = required_str(params, "fullName")?;
    let id = Uuid::new_v4().to_string();
    ctx.store.insert("teachers", &[row! { "id" => id, "full_name" => full_name }])?;
    Ok(json!({ "teacherId": id }))
}

fn subjects_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "subjects",
        &[row! { "id" => id, "name" => name, "code" => optional_str(params, "code")? }],
    )?;
    Ok(json!({ "subjectId": id }))
}

fn teacher_subjects_assign(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let subject_id = required_str(params, "subjectId")?;
    require_exists(&ctx.store, "teachers", "teacherId", teacher_id)?;
    require_exists(&ctx.store, "subjects", "subjectId", subject_id)?;
    let class_name = optional_str(params, "className")?;
    let section = optional_str(params, "section")?;
    let class = match class_name {
        Some(label) => Some(class_of(label, section)?),
        None if section.is_some() => {
            return Err(HandlerErr::bad_params("section needs className"));
        }
        None => None,
    };
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "teacher_subjects",
        &[row! {
            "id" => id,
            "teacher_id" => teacher_id,
            "subject_id" => subject_id,
            "class_name" => class_name,
            "section" => section,
        }],
    )?;
    Ok(json!({ "assignmentId": id, "class": class }))
}

/// Places a subject in a day/period for a class. An existing slot for the
/// same class at that time is replaced, keeping one slot per cell.
fn timetable_set_slot(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let cfg = ctx.config()?;
    let day = canonical_day(required_str(params, "day")?)
        .ok_or_else(|| HandlerErr::bad_params("day must be a weekday name"))?;
    if !cfg.days.contains(&day) {
        return Err(HandlerErr::bad_params(format!("{} is not a school day", day)));
    }
    let period = required_u32(params, "period")?;
    if !(1..=cfg.periods_per_day).contains(&period) {
        return Err(HandlerErr::bad_params(format!(
            "period must be in 1..={}",
            cfg.periods_per_day
        )));
    }
    let subject_id = required_str(params, "subjectId")?;
    require_exists(&ctx.store, "subjects", "subjectId", subject_id)?;
    let teacher_id = optional_str(params, "teacherId")?;
    if let Some(t) = teacher_id {
        require_exists(&ctx.store, "teachers", "teacherId", t)?;
    }
    let class_name = required_str(params, "className")?;
    let section = optional_str(params, "section")?;
    let class = class_of(class_name, section)?;

    let same_time: Vec<LabelledRow> = fetch(
        &ctx.store,
        Select::from("timetable_slots")
            .columns(&["id", "class_name", "section"])
            .filter(Filter::Eq("day", day.as_str().into()))
            .filter(Filter::Eq("period", period.into())),
    )?;
    let fields = row! {
        "subject_id" => subject_id,
        "teacher_id" => teacher_id,
        "class_name" => class_name,
        "section" => section,
    };
    let (slot_id, replaced) = match find_by_class(same_time, &class) {
        Some(id) => {
            ctx.store
                .update("timetable_slots", &fields, &[Filter::Eq("id", id.as_str().into())])?;
            (id, true)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            let mut r = fields;
            r.insert("id".to_string(), json!(id));
            r.insert("day".to_string(), json!(day));
            r.insert("period".to_string(), json!(period));
            ctx.store.insert("timetable_slots", &[r])?;
            (id, false)
        }
    };
    Ok(json!({ "slotId": slot_id, "replaced": replaced, "class": class }))
}

fn exams_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let classes = string_list(params, "classes")?;
    if classes.is_empty() {
        return Err(HandlerErr::bad_params("classes must not be empty"));
    }
    for label in &classes {
        class_of(label, None)?;
    }
    let start = optional_date(params, "startDate")?;
    let end = optional_date(params, "endDate")?;
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(HandlerErr::bad_params("endDate is before startDate"));
        }
    }
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "exams",
        &[row! {
            "id" => id,
            "name" => name,
            "classes" => classes,
            "start_date" => start.map(|d| d.to_string()),
            "end_date" => end.map(|d| d.to_string()),
        }],
    )?;
    Ok(json!({ "examId": id }))
}

fn exams_add_schedule(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let subject_id = required_str(params, "subjectId")?;
    require_exists(&ctx.store, "exams", "examId", exam_id)?;
    require_exists(&ctx.store, "subjects", "subjectId", subject_id)?;
    let exam_date = required_date(params, "examDate")?;
    let class_name = required_str(params, "className")?;
    let class = class_of(class_name, None)?;
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "exam_schedule",
        &[row! {
            "id" => id,
            "exam_id" => exam_id,
            "subject_id" => subject_id,
            "exam_date" => exam_date.to_string(),
            "start_time" => optional_str(params, "startTime")?,
            "end_time" => optional_str(params, "endTime")?,
            "room" => optional_str(params, "room")?,
            "class_name" => class_name,
        }],
    )?;
    Ok(json!({ "scheduleId": id, "class": class }))
}

/// One syllabus per (exam name, subject, class); a second upsert replaces the
/// chapter list.
fn syllabus_upsert(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let exam_name = required_str(params, "examName")?;
    let subject_id = required_str(params, "subjectId")?;
    require_exists(&ctx.store, "subjects", "subjectId", subject_id)?;
    let class_name = required_str(params, "className")?;
    let class = class_of(class_name, None)?;
    let chapters = string_list(params, "chapters")?;

    let candidates: Vec<LabelledRow> = fetch(
        &ctx.store,
        Select::from("syllabus")
            .columns(&["id", "class_name"])
            .filter(Filter::Eq("subject_id", subject_id.into()))
            .filter(Filter::ILike("exam_name", exam_name.to_string())),
    )?;
    match find_by_class(candidates, &class) {
        Some(id) => {
            ctx.store.update(
                "syllabus",
                &row! { "chapters" => chapters },
                &[Filter::Eq("id", id.as_str().into())],
            )?;
            Ok(json!({ "syllabusId": id, "replaced": true }))
        }
        None => {
            let id = Uuid::new_v4().to_string();
            ctx.store.insert(
                "syllabus",
                &[row! {
                    "id" => id,
                    "exam_name" => exam_name,
                    "class_name" => class_name,
                    "subject_id" => subject_id,
                    "chapters" => chapters,
                }],
            )?;
            Ok(json!({ "syllabusId": id, "replaced": false }))
        }
    }
}

fn fees_create(ctx: &Ctx<'_>, params: &Value) -> Result<Value, HandlerErr> {
    let class_name = required_str(params, "className")?;
    let class = class_of(class_name, None)?;
    let fee_type = required_str(params, "feeType")?;
    let amount = optional_f64(params, "amount")?
        .filter(|a| a.is_finite() && *a >= 0.0)
        .ok_or_else(|| HandlerErr::bad_params("amount must be a non-negative number"))?;
    let id = Uuid::new_v4().to_string();
    ctx.store.insert(
        "fees",
        &[row! {
            "id" => id,
            "class_name" => class_name,
            "fee_type" => fee_type,
            "amount" => amount,
        }],
    )?;
    Ok(json!({ "feeId": id, "grade": class.grade }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Ctx<'_>, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "users.create" => users_create,
        "students.create" => students_create,
        "teachers.create" => teachers_create,
        "subjects.create" => subjects_create,
        "teacherSubjects.assign" => teacher_subjects_assign,
        "timetable.setSlot" => timetable_set_slot,
        "exams.create" => exams_create,
        "exams.addSchedule" => exams_add_schedule,
        "syllabus.upsert" => syllabus_upsert,
        "fees.create" => fees_create,
        _ => return None,
    };
    Some(with_session(state, req, ADMIN_ONLY, |ctx| body(ctx, &req.params)))
}
