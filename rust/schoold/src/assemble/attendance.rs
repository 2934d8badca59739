use super::marks::class_roster;
use super::rows::AttendanceRow;
use super::scope::{StudentScope, TeacherScope};
use super::{distinct, NameLookup, Notices};
use crate::config::SchoolConfig;
use crate::error::AssembleError;
use crate::group::group_by_ordered;
use crate::normalize::ClassKey;
use crate::row;
use crate::store::{fetch, DataStore, Filter, Select};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Leave,
    Holiday,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "leave" => Some(Self::Leave),
            "holiday" => Some(Self::Holiday),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Leave => "leave",
            Self::Holiday => "holiday",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub leave: usize,
    pub holiday: usize,
    pub unknown: usize,
    /// Attended over non-holiday records, in percent; 0 with nothing to count.
    pub percent: f64,
}

impl AttendanceCounts {
    fn tally<'a>(rows: impl IntoIterator<Item = &'a AttendanceRow>, count_late: bool) -> Self {
        let mut c = Self::default();
        for r in rows {
            match AttendanceStatus::parse(&r.status) {
                Some(AttendanceStatus::Present) => c.present += 1,
                Some(AttendanceStatus::Absent) => c.absent += 1,
                Some(AttendanceStatus::Late) => c.late += 1,
                Some(AttendanceStatus::Leave) => c.leave += 1,
                Some(AttendanceStatus::Holiday) => c.holiday += 1,
                None => c.unknown += 1,
            }
        }
        let attended = c.present + if count_late { c.late } else { 0 };
        let countable = c.present + c.absent + c.late + c.leave + c.unknown;
        if countable > 0 {
            c.percent = attended as f64 * 100.0 / countable as f64;
        }
        c
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendance {
    pub subject_id: String,
    pub subject_name: String,
    pub counts: AttendanceCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub date: String,
    pub period: u32,
    pub subject_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub student: StudentScope,
    pub overall: AttendanceCounts,
    pub by_subject: Vec<SubjectAttendance>,
    pub records: Vec<AttendanceRecord>,
    pub notices: Notices,
}

/// Attendance for one student over an optional date range. Holidays are
/// excluded from the percentage.
pub fn student_attendance(
    store: &dyn DataStore,
    cfg: &SchoolConfig,
    student: &StudentScope,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<AttendanceSummary, AssembleError> {
    let mut q = Select::from("attendance")
        .filter(Filter::Eq("student_id", student.student_id.as_str().into()))
        .order_by("date")
        .order_by("period");
    if let Some(d) = from {
        q = q.filter(Filter::Gte("date", d.to_string().into()));
    }
    if let Some(d) = to {
        q = q.filter(Filter::Lte("date", d.to_string().into()));
    }
    let rows: Vec<AttendanceRow> = fetch(store, q).map_err(AssembleError::fetch("attendance"))?;

    let mut notices = Notices::default();
    let subjects = NameLookup::subjects(
        store,
        &distinct(rows.iter().map(|r| r.subject_id.as_str())),
        &mut notices,
    );
    let overall = AttendanceCounts::tally(&rows, cfg.count_late_as_present);
    let by_subject = group_by_ordered(rows.iter(), |r| r.subject_id.clone())
        .into_iter()
        .map(|g| SubjectAttendance {
            subject_name: subjects.name(&g.key, &mut notices),
            counts: AttendanceCounts::tally(g.items, cfg.count_late_as_present),
            subject_id: g.key,
        })
        .collect();
    let records = rows
        .into_iter()
        .map(|r| AttendanceRecord {
            date: r.date,
            period: r.period,
            subject_id: r.subject_id,
            status: r.status,
        })
        .collect();

    Ok(AttendanceSummary {
        student: student.clone(),
        overall,
        by_subject,
        records,
        notices,
    })
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
    pub recorded: usize,
    pub updated: usize,
    pub rejected: Vec<String>,
}

/// Records one period of attendance. A second call for the same
/// (student, subject, date, period) replaces the status.
pub fn mark_attendance(
    store: &dyn DataStore,
    teacher: &TeacherScope,
    class: &ClassKey,
    subject_id: &str,
    date: NaiveDate,
    period: u32,
    marks: &[AttendanceMark],
) -> Result<MarkOutcome, AssembleError> {
    if !teacher.teaches(subject_id, class) {
        return Err(AssembleError::NoScope(format!(
            "teacher {} does not teach {} to {}",
            teacher.teacher.id, subject_id, class
        )));
    }
    let roster: HashSet<String> = class_roster(store, class)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let day = date.to_string();
    let existing: HashSet<String> = fetch::<AttendanceRow>(
        store,
        Select::from("attendance")
            .filter(Filter::Eq("subject_id", subject_id.into()))
            .filter(Filter::Eq("date", day.as_str().into()))
            .filter(Filter::Eq("period", period.into())),
    )
    .map_err(AssembleError::fetch("attendance"))?
    .into_iter()
    .map(|r| r.student_id)
    .collect();

    let mut out = MarkOutcome::default();
    for m in marks {
        if !roster.contains(&m.student_id) {
            out.rejected.push(m.student_id.clone());
            continue;
        }
        if existing.contains(&m.student_id) {
            store
                .update(
                    "attendance",
                    &row! { "status" => m.status.as_str(), "teacher_id" => teacher.teacher.id },
                    &[
                        Filter::Eq("student_id", m.student_id.as_str().into()),
                        Filter::Eq("subject_id", subject_id.into()),
                        Filter::Eq("date", day.as_str().into()),
                        Filter::Eq("period", period.into()),
                    ],
                )
                .map_err(AssembleError::fetch("attendance"))?;
            out.updated += 1;
        } else {
            store
                .insert(
                    "attendance",
                    &[row! {
                        "id" => Uuid::new_v4().to_string(),
                        "student_id" => m.student_id,
                        "subject_id" => subject_id,
                        "teacher_id" => teacher.teacher.id,
                        "date" => day,
                        "period" => period,
                        "status" => m.status.as_str(),
                    }],
                )
                .map_err(AssembleError::fetch("attendance"))?;
            out.recorded += 1;
        }
    }
    Ok(out)
}
