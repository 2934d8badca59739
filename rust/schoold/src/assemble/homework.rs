use super::rows::HomeworkRow;
use super::scope::TeacherScope;
use super::{distinct, NameLookup, Notices};
use crate::error::AssembleError;
use crate::normalize::{normalize, ClassKey};
use crate::row;
use crate::store::{fetch, DataStore, Filter, Select};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkItem {
    pub id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub teacher_name: String,
    pub class_label: String,
    pub assigned_date: String,
    pub due_date: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkView {
    pub class: ClassKey,
    pub items: Vec<HomeworkItem>,
    pub notices: Notices,
}

/// Homework for a class+section, soonest due first. `due_from` drops items
/// due before that date.
pub fn class_homework(
    store: &dyn DataStore,
    class: &ClassKey,
    due_from: Option<NaiveDate>,
) -> Result<HomeworkView, AssembleError> {
    let mut q = Select::from("homework")
        .order_by("due_date")
        .order_by("assigned_date");
    if let Some(d) = due_from {
        q = q.filter(Filter::Gte("due_date", d.to_string().into()));
    }
    let rows: Vec<HomeworkRow> = fetch(store, q).map_err(AssembleError::fetch("homework"))?;

    let mut matched: Vec<(HomeworkRow, ClassKey)> = Vec::with_capacity(rows.len());
    for r in rows {
        match normalize(&r.class_name, r.section.as_deref()) {
            Ok(k) if k.covers(class) => matched.push((r, k)),
            Ok(_) => {}
            Err(e) => tracing::warn!(homework = %r.id, error = %e, "skipping homework row"),
        }
    }

    let mut notices = Notices::default();
    let subjects = NameLookup::subjects(
        store,
        &distinct(matched.iter().map(|(r, _)| r.subject_id.as_str())),
        &mut notices,
    );
    let teachers = NameLookup::teachers(
        store,
        &distinct(matched.iter().map(|(r, _)| r.teacher_id.as_str())),
        &mut notices,
    );

    let items = matched
        .into_iter()
        .map(|(r, k)| HomeworkItem {
            subject_name: subjects.name(&r.subject_id, &mut notices),
            teacher_name: teachers.name(&r.teacher_id, &mut notices),
            id: r.id,
            subject_id: r.subject_id,
            class_label: k.canonical(),
            assigned_date: r.assigned_date,
            due_date: r.due_date,
            title: r.title,
            description: r.description,
        })
        .collect();

    Ok(HomeworkView {
        class: class.clone(),
        items,
        notices,
    })
}

#[derive(Debug, Clone)]
pub struct NewHomework {
    pub class: ClassKey,
    pub subject_id: String,
    pub assigned_date: NaiveDate,
    pub due_date: NaiveDate,
    pub title: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HomeworkRejected {
    #[error("teacher is not assigned to this subject and class")]
    NotAssigned,
    #[error("due date is before the assigned date")]
    DueBeforeAssigned,
    #[error("title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

pub fn create_homework(
    store: &dyn DataStore,
    teacher: &TeacherScope,
    hw: &NewHomework,
) -> Result<String, HomeworkRejected> {
    if !teacher.teaches(&hw.subject_id, &hw.class) {
        return Err(HomeworkRejected::NotAssigned);
    }
    if hw.due_date < hw.assigned_date {
        return Err(HomeworkRejected::DueBeforeAssigned);
    }
    let title = hw.title.trim();
    if title.is_empty() {
        return Err(HomeworkRejected::EmptyTitle);
    }
    let id = Uuid::new_v4().to_string();
    store
        .insert(
            "homework",
            &[row! {
                "id" => id,
                "class_name" => hw.class.grade.to_string(),
                "section" => hw.class.section,
                "subject_id" => hw.subject_id,
                "teacher_id" => teacher.teacher.id,
                "assigned_date" => hw.assigned_date.to_string(),
                "due_date" => hw.due_date.to_string(),
                "title" => title,
                "description" => hw.description.trim(),
            }],
        )
        .map_err(AssembleError::fetch("homework"))?;
    Ok(id)
}
