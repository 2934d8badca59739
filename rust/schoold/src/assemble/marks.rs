use super::exams::exams_for_grade;
use super::rows::{ExamRow, MarksRow, StudentRow};
use super::scope::StudentScope;
use super::{distinct, NameLookup, Notices};
use crate::config::SchoolConfig;
use crate::error::AssembleError;
use crate::group::{build_matrix, left_join, Matrix};
use crate::normalize::{normalize, ClassKey};
use crate::row;
use crate::store::{fetch, fetch_one, DataStore, Filter, Select};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkStatus {
    Pending,
    Pass,
    Fail,
    Absent,
}

impl MarkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Absent => "absent",
        }
    }
}

/// Pass/fail from the configured percentage. `absent` overrides the numbers.
/// Without a usable total the threshold is read as absolute marks out of 100.
pub fn classify(
    marks_obtained: Option<f64>,
    total_marks: f64,
    absent: bool,
    threshold_percent: f64,
) -> MarkStatus {
    if absent {
        return MarkStatus::Absent;
    }
    let Some(obtained) = marks_obtained else {
        return MarkStatus::Pending;
    };
    let passed = if total_marks > 0.0 {
        obtained * 100.0 / total_marks >= threshold_percent
    } else {
        obtained >= threshold_percent
    };
    if passed {
        MarkStatus::Pass
    } else {
        MarkStatus::Fail
    }
}

fn stored_status(row: &MarksRow, threshold_percent: f64) -> MarkStatus {
    classify(
        row.marks_obtained,
        row.total_marks,
        row.status.eq_ignore_ascii_case("absent"),
        threshold_percent,
    )
}

/// Active students of `class`. Students whose labels cannot be resolved are
/// left out rather than guessed into a class.
pub fn class_roster(store: &dyn DataStore, class: &ClassKey) -> Result<Vec<StudentRow>, AssembleError> {
    let rows: Vec<StudentRow> = fetch(
        store,
        Select::from("students")
            .filter(Filter::Eq("active", 1.into()))
            .order_by("roll_no"),
    )
    .map_err(AssembleError::fetch("students"))?;

    let mut out = Vec::with_capacity(rows.len());
    for s in rows.into_iter().filter(|s| s.active) {
        match normalize(&s.class_name, s.section.as_deref()) {
            Ok(k) if class.covers(&k) => out.push(s),
            Ok(_) => {}
            Err(e) => tracing::warn!(student = %s.id, error = %e, "student left out of roster"),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterMark {
    pub student_id: String,
    pub full_name: String,
    pub roll_no: i64,
    pub status: MarkStatus,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
    pub remarks: Option<String>,
    /// Persisted rows cannot be edited again.
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRosterView {
    pub exam_id: String,
    pub exam_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub class: ClassKey,
    pub default_total_marks: f64,
    pub pending_count: usize,
    pub rows: Vec<RosterMark>,
    pub notices: Notices,
}

fn exam_name(store: &dyn DataStore, exam_id: &str, notices: &mut Notices) -> Result<String, AssembleError> {
    let exam: Option<ExamRow> = fetch_one(
        store,
        Select::from("exams").filter(Filter::Eq("id", exam_id.into())),
    )
    .map_err(AssembleError::fetch("exams"))?;
    Ok(match exam {
        Some(e) => e.name,
        None => {
            notices.push(&AssembleError::UnmatchedForeignKey {
                kind: "exam",
                id: exam_id.to_string(),
            });
            "Unknown exam".to_string()
        }
    })
}

fn marks_for(
    store: &dyn DataStore,
    exam_id: &str,
    subject_id: &str,
    student_ids: &[&str],
) -> Result<Vec<MarksRow>, AssembleError> {
    fetch(
        store,
        Select::from("marks")
            .filter(Filter::Eq("exam_id", exam_id.into()))
            .filter(Filter::Eq("subject_id", subject_id.into()))
            .filter(Filter::any_of("student_id", student_ids)),
    )
    .map_err(AssembleError::fetch("marks"))
}

/// Orders pending rows first, then by roll number within each partition.
pub fn order_for_entry(rows: &mut [RosterMark]) {
    rows.sort_by(|a, b| {
        let pa = a.status != MarkStatus::Pending;
        let pb = b.status != MarkStatus::Pending;
        pa.cmp(&pb)
            .then(a.roll_no.cmp(&b.roll_no))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
}

/// Roster left-joined with marks for one exam and subject. Every active
/// student appears exactly once.
pub fn marks_roster(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    exam_id: &str,
    subject_id: &str,
    class: &ClassKey,
) -> Result<MarksRosterView, AssembleError> {
    let mut notices = Notices::default();
    let roster = class_roster(store, class)?;
    let ids: Vec<&str> = roster.iter().map(|s| s.id.as_str()).collect();
    let marks = marks_for(store, exam_id, subject_id, &ids)?;
    let exam_name = exam_name(store, exam_id, &mut notices)?;
    let subject_name = NameLookup::subjects(store, &[subject_id], &mut notices)
        .name(subject_id, &mut notices);

    let mut rows: Vec<RosterMark> = left_join(roster, &marks, |s| s.id.clone(), |m| m.student_id.clone())
        .into_iter()
        .map(|(s, m)| RosterMark {
            status: m.map_or(MarkStatus::Pending, |m| stored_status(m, cfg.pass_threshold_percent)),
            marks_obtained: m.and_then(|m| m.marks_obtained),
            total_marks: m.map(|m| m.total_marks),
            remarks: m.and_then(|m| m.remarks.clone()),
            locked: m.is_some(),
            student_id: s.id,
            full_name: s.full_name,
            roll_no: s.roll_no,
        })
        .collect();
    order_for_entry(&mut rows);

    Ok(MarksRosterView {
        exam_id: exam_id.to_string(),
        exam_name,
        subject_id: subject_id.to_string(),
        subject_name,
        class: class.clone(),
        default_total_marks: cfg.default_total_marks,
        pending_count: rows.iter().filter(|r| r.status == MarkStatus::Pending).count(),
        rows,
        notices,
    })
}

#[derive(Debug, Clone)]
pub struct MarkSubmission {
    pub student_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
    pub absent: bool,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejected {
    pub student_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub inserted: Vec<String>,
    pub locked: Vec<String>,
    pub rejected: Vec<Rejected>,
}

fn validate(sub: &MarkSubmission, default_total: f64) -> Result<(Option<f64>, f64), String> {
    let total = sub.total_marks.unwrap_or(default_total);
    if !(total > 0.0) {
        return Err("totalMarks must be > 0".to_string());
    }
    if sub.absent {
        return Ok((None, total));
    }
    let Some(obtained) = sub.marks_obtained else {
        return Err("marksObtained is required unless absent".to_string());
    };
    if !(0.0..=total).contains(&obtained) {
        return Err(format!("marksObtained must be in 0..={}", total));
    }
    Ok((Some(obtained), total))
}

/// Persists new marks. Rows that already exist stay as they are; students
/// outside the class roster are rejected.
pub fn submit_marks(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    exam_id: &str,
    subject_id: &str,
    class: &ClassKey,
    entries: &[MarkSubmission],
) -> Result<SubmitOutcome, AssembleError> {
    let roster = class_roster(store, class)?;
    let roster_ids: HashSet<&str> = roster.iter().map(|s| s.id.as_str()).collect();
    let requested: Vec<&str> = distinct(entries.iter().map(|e| e.student_id.as_str()));
    let existing: HashSet<String> = marks_for(store, exam_id, subject_id, &requested)?
        .into_iter()
        .map(|m| m.student_id)
        .collect();

    let mut outcome = SubmitOutcome::default();
    let mut seen: HashSet<&str> = HashSet::new();
    for sub in entries {
        let sid = sub.student_id.as_str();
        if !roster_ids.contains(sid) {
            outcome.rejected.push(Rejected {
                student_id: sid.to_string(),
                reason: "student is not in the class roster".to_string(),
            });
            continue;
        }
        if existing.contains(sid) || !seen.insert(sid) {
            outcome.locked.push(sid.to_string());
            continue;
        }
        let (obtained, total) = match validate(sub, cfg.default_total_marks) {
            Ok(v) => v,
            Err(reason) => {
                outcome.rejected.push(Rejected {
                    student_id: sid.to_string(),
                    reason,
                });
                continue;
            }
        };
        let status = classify(obtained, total, sub.absent, cfg.pass_threshold_percent);
        store
            .insert(
                "marks",
                &[row! {
                    "id" => Uuid::new_v4().to_string(),
                    "student_id" => sid,
                    "subject_id" => subject_id,
                    "exam_id" => exam_id,
                    "marks_obtained" => obtained,
                    "total_marks" => total,
                    "status" => status.as_str(),
                    "remarks" => sub.remarks.as_deref().map(str::trim).filter(|r| !r.is_empty()),
                    "created_at" => chrono::Utc::now().to_rfc3339(),
                }],
            )
            .map_err(AssembleError::fetch("marks"))?;
        outcome.inserted.push(sid.to_string());
    }
    tracing::info!(
        exam = %exam_id,
        subject = %subject_id,
        inserted = outcome.inserted.len(),
        locked = outcome.locked.len(),
        rejected = outcome.rejected.len(),
        "marks submitted"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportCell {
    pub status: MarkStatus,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
}

impl ReportCell {
    fn pending() -> Self {
        Self {
            status: MarkStatus::Pending,
            marks_obtained: None,
            total_marks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Labelled {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTotal {
    pub exam_id: String,
    pub obtained: f64,
    pub total: f64,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardView {
    pub student: StudentScope,
    pub subjects: Vec<Labelled>,
    pub exams: Vec<Labelled>,
    /// Subject rows by exam columns.
    pub matrix: Matrix<String, String, ReportCell>,
    pub exam_totals: Vec<ExamTotal>,
    pub notices: Notices,
}

/// A student's marks as a subject by exam grid. Exams the grade sits but
/// without marks yet appear as pending columns.
pub fn report_card(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    student: &StudentScope,
) -> Result<ReportCardView, AssembleError> {
    let mut notices = Notices::default();
    let marks: Vec<MarksRow> = fetch(
        store,
        Select::from("marks").filter(Filter::Eq("student_id", student.student_id.as_str().into())),
    )
    .map_err(AssembleError::fetch("marks"))?;

    let grade_exams = exams_for_grade(store, student.class.grade)?;
    let mut exam_ids: Vec<String> = grade_exams.iter().map(|e| e.id.clone()).collect();
    let mut exam_names: HashMap<String, String> = grade_exams
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect();
    let extra: Vec<&str> = distinct(marks.iter().map(|m| m.exam_id.as_str()))
        .into_iter()
        .filter(|id| !exam_names.contains_key(*id))
        .collect();
    if !extra.is_empty() {
        let rows: Vec<ExamRow> = fetch(
            store,
            Select::from("exams")
                .filter(Filter::any_of("id", &extra))
                .order_by("start_date"),
        )
        .map_err(AssembleError::fetch("exams"))?;
        for e in rows {
            exam_names.insert(e.id, e.name);
        }
        exam_ids.extend(extra.iter().map(|s| s.to_string()));
    }

    let subject_ids = distinct(marks.iter().map(|m| m.subject_id.as_str()));
    let lookup = NameLookup::subjects(store, &subject_ids, &mut notices);
    let mut subjects: Vec<Labelled> = subject_ids
        .iter()
        .map(|id| Labelled {
            id: id.to_string(),
            name: lookup.name(id, &mut notices),
        })
        .collect();
    subjects.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let exams: Vec<Labelled> = exam_ids
        .iter()
        .map(|id| Labelled {
            id: id.clone(),
            name: match exam_names.get(id) {
                Some(n) => n.clone(),
                None => {
                    notices.push(&AssembleError::UnmatchedForeignKey {
                        kind: "exam",
                        id: id.clone(),
                    });
                    "Unknown exam".to_string()
                }
            },
        })
        .collect();

    let exam_totals = exams
        .iter()
        .map(|e| {
            let (obtained, total) = marks
                .iter()
                .filter(|m| m.exam_id == e.id && !m.status.eq_ignore_ascii_case("absent"))
                .fold((0.0, 0.0), |(o, t), m| {
                    (o + m.marks_obtained.unwrap_or(0.0), t + m.total_marks)
                });
            ExamTotal {
                exam_id: e.id.clone(),
                obtained,
                total,
                percent: (total > 0.0).then(|| obtained * 100.0 / total),
            }
        })
        .collect();

    let row_keys: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let col_keys: Vec<String> = exams.iter().map(|e| e.id.clone()).collect();
    let triples = marks.iter().map(|m| {
        (
            m.subject_id.clone(),
            m.exam_id.clone(),
            ReportCell {
                status: stored_status(m, cfg.pass_threshold_percent),
                marks_obtained: m.marks_obtained,
                total_marks: Some(m.total_marks),
            },
        )
    });
    let matrix = build_matrix(&row_keys, &col_keys, triples, ReportCell::pending());

    Ok(ReportCardView {
        student: student.clone(),
        subjects,
        exams,
        matrix,
        exam_totals,
        notices,
    })
}
