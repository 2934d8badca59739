use super::rows::{ExamRow, ScheduleRow, SyllabusRow};
use super::{distinct, NameLookup, Notices};
use crate::error::AssembleError;
use crate::group::group_by_ordered;
use crate::normalize::{grade_label_variants, normalize, ClassKey};
use crate::store::{fetch, DataStore, Filter, Select};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyllabusAttachment {
    Attached { chapters: Vec<String> },
    Pending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamEntry {
    pub schedule_id: String,
    pub exam_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: Option<String>,
    pub date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub room: Option<String>,
    pub class_label: String,
    pub syllabus: SyllabusAttachment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamGroup {
    pub exam_name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub entries: Vec<ExamEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTimetableView {
    pub class: ClassKey,
    pub exams: Vec<ExamGroup>,
    pub notices: Notices,
}

fn exam_name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

struct Located {
    row: ScheduleRow,
    class: ClassKey,
}

fn schedule_for_class(
    store: &dyn DataStore,
    class: &ClassKey,
) -> Result<Vec<Located>, AssembleError> {
    let rows: Vec<ScheduleRow> = fetch(
        store,
        Select::from("exam_schedule")
            .order_by("exam_date")
            .order_by("start_time"),
    )
    .map_err(AssembleError::fetch("exam_schedule"))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match normalize(&row.class_name, None) {
            Ok(k) if k.overlaps(class) => out.push(Located { row, class: k }),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "skipping exam schedule row"),
        }
    }
    Ok(out)
}

/// Syllabus rows keyed for lookup by (exam, subject), each with its
/// normalized class. A failed fetch leaves every entry pending and adds a
/// notice.
fn syllabus_index(
    store: &dyn DataStore,
    notices: &mut Notices,
) -> HashMap<(String, String), Vec<(ClassKey, Vec<String>)>> {
    let rows: Vec<SyllabusRow> = match fetch(store, Select::from("syllabus")) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "syllabus fetch failed");
            notices.push(&AssembleError::FetchFailed {
                table: "syllabus",
                source: e,
            });
            return HashMap::new();
        }
    };
    let mut index: HashMap<(String, String), Vec<(ClassKey, Vec<String>)>> = HashMap::new();
    for r in rows {
        let Ok(k) = normalize(&r.class_name, None) else {
            continue;
        };
        index
            .entry((exam_name_key(&r.exam_name), r.subject_id))
            .or_default()
            .push((k, r.chapters));
    }
    index
}

/// Exam schedule for a class grouped by exam, earliest first, each entry with
/// its syllabus or a pending marker.
pub fn exam_timetable(
    store: &dyn DataStore,
    class: &ClassKey,
) -> Result<ExamTimetableView, AssembleError> {
    let mut notices = Notices::default();
    let located = schedule_for_class(store, class)?;

    let exam_ids = distinct(located.iter().map(|l| l.row.exam_id.as_str()));
    let exams: HashMap<String, ExamRow> = if exam_ids.is_empty() {
        HashMap::new()
    } else {
        fetch::<ExamRow>(store, Select::from("exams").filter(Filter::any_of("id", &exam_ids)))
            .map_err(AssembleError::fetch("exams"))?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect()
    };

    let subjects = NameLookup::subjects(
        store,
        &distinct(located.iter().map(|l| l.row.subject_id.as_str())),
        &mut notices,
    );
    let syllabus = syllabus_index(store, &mut notices);

    let mut entries: Vec<(String, ExamEntry)> = Vec::with_capacity(located.len());
    for Located { row, class: row_class } in located {
        let exam_name = match exams.get(&row.exam_id) {
            Some(e) => e.name.clone(),
            None => {
                notices.push(&AssembleError::UnmatchedForeignKey {
                    kind: "exam",
                    id: row.exam_id.clone(),
                });
                "Unknown exam".to_string()
            }
        };
        let attachment = syllabus
            .get(&(exam_name_key(&exam_name), row.subject_id.clone()))
            .and_then(|cands| cands.iter().find(|(k, _)| k.overlaps(class)))
            .map(|(_, chapters)| SyllabusAttachment::Attached {
                chapters: chapters.clone(),
            })
            .unwrap_or(SyllabusAttachment::Pending);

        entries.push((
            exam_name,
            ExamEntry {
                subject_name: subjects.name(&row.subject_id, &mut notices),
                subject_code: subjects.code(&row.subject_id),
                schedule_id: row.id,
                exam_id: row.exam_id,
                subject_id: row.subject_id,
                date: row.exam_date,
                start_time: row.start_time,
                end_time: row.end_time,
                room: row.room,
                class_label: row_class.canonical(),
                syllabus: attachment,
            },
        ));
    }

    let groups = group_by_ordered(entries, |(name, _)| name.clone());
    let exams_out = groups
        .into_iter()
        .map(|g| {
            let def = g
                .items
                .first()
                .and_then(|(_, e)| exams.get(&e.exam_id));
            ExamGroup {
                start_date: def.and_then(|d| d.start_date.clone()),
                end_date: def.and_then(|d| d.end_date.clone()),
                exam_name: g.key,
                entries: g.items.into_iter().map(|(_, e)| e).collect(),
            }
        })
        .collect();

    Ok(ExamTimetableView {
        class: class.clone(),
        exams: exams_out,
        notices,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: String,
    pub name: String,
    pub classes: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl From<ExamRow> for ExamSummary {
    fn from(e: ExamRow) -> Self {
        Self {
            id: e.id,
            name: e.name,
            classes: e.classes,
            start_date: e.start_date,
            end_date: e.end_date,
        }
    }
}

/// Exam definitions whose class list names the grade in any stored spelling.
pub fn exams_for_grade(store: &dyn DataStore, grade: u32) -> Result<Vec<ExamSummary>, AssembleError> {
    let labels: Vec<serde_json::Value> = grade_label_variants(grade)
        .into_iter()
        .map(serde_json::Value::from)
        .collect();
    let rows: Vec<ExamRow> = fetch(
        store,
        Select::from("exams")
            .filter(Filter::Overlaps("classes", labels))
            .order_by("start_date"),
    )
    .map_err(AssembleError::fetch("exams"))?;
    Ok(rows.into_iter().map(ExamSummary::from).collect())
}

/// Exam definitions whose class list contains every one of `labels`.
pub fn exams_shared_by(store: &dyn DataStore, labels: &[String]) -> Result<Vec<ExamSummary>, AssembleError> {
    let rows: Vec<ExamRow> = fetch(
        store,
        Select::from("exams")
            .filter(Filter::Contains(
                "classes",
                labels.iter().map(|l| serde_json::Value::from(l.as_str())).collect(),
            ))
            .order_by("start_date"),
    )
    .map_err(AssembleError::fetch("exams"))?;
    Ok(rows.into_iter().map(ExamSummary::from).collect())
}
