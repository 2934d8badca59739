//! Scope resolution. Every assembly starts here; a failure is `NoScope` and
//! the assembly stops, so nothing downstream can run without a scope.

use super::rows::{StudentRow, TeacherRow, TeacherSubjectRow};
use crate::error::AssembleError;
use crate::normalize::{normalize, ClassKey};
use crate::session::{Role, SessionContext};
use crate::store::{fetch, fetch_one, DataStore, Filter, Select};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScope {
    pub student_id: String,
    pub full_name: String,
    pub roll_no: i64,
    pub academic_year: Option<String>,
    pub class: ClassKey,
}

pub fn load_student(store: &dyn DataStore, id: &str) -> Result<Option<StudentRow>, AssembleError> {
    fetch_one(
        store,
        Select::from("students").filter(Filter::Eq("id", id.into())),
    )
    .map_err(AssembleError::fetch("students"))
}

/// Parents see their bound student only. Teachers and admins name the student.
pub fn resolve_student(
    store: &dyn DataStore,
    session: &SessionContext,
    requested: Option<&str>,
) -> Result<StudentScope, AssembleError> {
    let student_id = match session.role {
        Role::Parent => {
            let Some(bound) = session.student_id.as_deref() else {
                return Err(AssembleError::NoScope(
                    "parent session has no student".to_string(),
                ));
            };
            if requested.is_some_and(|r| r != bound) {
                return Err(AssembleError::NoScope(
                    "parent session is bound to another student".to_string(),
                ));
            }
            bound
        }
        Role::Teacher | Role::Admin => requested.ok_or_else(|| {
            AssembleError::NoScope("studentId is required for this session".to_string())
        })?,
    };

    let Some(student) = load_student(store, student_id)? else {
        return Err(AssembleError::NoScope(format!("student {student_id} not found")));
    };
    let class = normalize(&student.class_name, student.section.as_deref())?;
    Ok(StudentScope {
        student_id: student.id,
        full_name: student.full_name,
        roll_no: student.roll_no,
        academic_year: student.academic_year,
        class,
    })
}

#[derive(Debug, Clone)]
pub struct TeacherScope {
    pub teacher: TeacherRow,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub subject_id: String,
    /// `None` when the assignment covers the subject in every class.
    pub class: Option<ClassKey>,
}

impl TeacherScope {
    /// Access check: an assignment must cover the whole requested class, so a
    /// section-level assignment never grants the bare grade.
    pub fn teaches(&self, subject_id: &str, class: &ClassKey) -> bool {
        self.assignments.iter().any(|a| {
            a.subject_id == subject_id && a.class.as_ref().map_or(true, |k| k.covers(class))
        })
    }

    pub fn teaches_class(&self, class: &ClassKey) -> bool {
        self.assignments
            .iter()
            .any(|a| a.class.as_ref().map_or(true, |k| k.covers(class)))
    }

    /// Display match for stored rows: a class-level row also shows to a
    /// teacher assigned to one of its sections. Grants no access.
    pub fn shares_row(&self, subject_id: &str, class: &ClassKey) -> bool {
        self.assignments.iter().any(|a| {
            a.subject_id == subject_id && a.class.as_ref().map_or(true, |k| k.overlaps(class))
        })
    }
}

pub fn resolve_teacher(
    store: &dyn DataStore,
    session: &SessionContext,
    requested: Option<&str>,
) -> Result<TeacherScope, AssembleError> {
    let teacher_id = match session.role {
        Role::Teacher => session
            .teacher_id
            .as_deref()
            .ok_or_else(|| AssembleError::NoScope("teacher session has no teacher".to_string()))?,
        Role::Admin => requested.ok_or_else(|| {
            AssembleError::NoScope("teacherId is required for this session".to_string())
        })?,
        Role::Parent => {
            return Err(AssembleError::NoScope(
                "parent sessions have no teacher scope".to_string(),
            ))
        }
    };

    let teacher: Option<TeacherRow> = fetch_one(
        store,
        Select::from("teachers").filter(Filter::Eq("id", teacher_id.into())),
    )
    .map_err(AssembleError::fetch("teachers"))?;
    let Some(teacher) = teacher else {
        return Err(AssembleError::NoScope(format!("teacher {teacher_id} not found")));
    };

    let rows: Vec<TeacherSubjectRow> = fetch(
        store,
        Select::from("teacher_subjects").filter(Filter::Eq("teacher_id", teacher_id.into())),
    )
    .map_err(AssembleError::fetch("teacher_subjects"))?;

    let mut assignments = Vec::with_capacity(rows.len());
    for r in rows {
        let class = match r.class_name.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(label) => match normalize(label, r.section.as_deref()) {
                Ok(k) => Some(k),
                Err(e) => {
                    // An unreadable assignment grants nothing.
                    tracing::warn!(teacher = %teacher_id, error = %e, "skipping assignment");
                    continue;
                }
            },
        };
        assignments.push(Assignment {
            subject_id: r.subject_id,
            class,
        });
    }

    Ok(TeacherScope {
        teacher,
        assignments,
    })
}

/// Resolves the class an assembly runs against. Parents get their student's
/// class regardless of what was asked; teachers must teach the class.
pub fn resolve_class(
    store: &dyn DataStore,
    session: &SessionContext,
    class_label: Option<&str>,
    section: Option<&str>,
) -> Result<ClassKey, AssembleError> {
    match session.role {
        Role::Parent => Ok(resolve_student(store, session, None)?.class),
        Role::Admin => {
            let label = class_label
                .ok_or_else(|| AssembleError::NoScope("classLabel is required".to_string()))?;
            normalize(label, section)
        }
        Role::Teacher => {
            let label = class_label
                .ok_or_else(|| AssembleError::NoScope("classLabel is required".to_string()))?;
            let key = normalize(label, section)?;
            let teacher = resolve_teacher(store, session, None)?;
            if !teacher.teaches_class(&key) {
                return Err(AssembleError::NoScope(format!(
                    "teacher {} is not assigned to class {}",
                    teacher.teacher.id, key
                )));
            }
            Ok(key)
        }
    }
}
