//! Typed rows for each table, parsed at the store boundary.

use serde::{Deserialize, Deserializer};

/// SQLite has no boolean type; accept `0/1` as well as JSON booleans.
fn de_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentRow {
    pub id: String,
    pub full_name: String,
    pub class_name: String,
    pub section: Option<String>,
    #[serde(default)]
    pub roll_no: i64,
    pub academic_year: Option<String>,
    #[serde(deserialize_with = "de_bool")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeacherRow {
    pub id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectRow {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeacherSubjectRow {
    pub subject_id: String,
    pub class_name: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotRow {
    pub day: String,
    pub period: u32,
    pub subject_id: String,
    pub teacher_id: Option<String>,
    pub class_name: String,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExamRow {
    pub id: String,
    pub name: String,
    pub classes: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRow {
    pub id: String,
    pub exam_id: String,
    pub subject_id: String,
    pub exam_date: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub room: Option<String>,
    pub class_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyllabusRow {
    pub exam_name: String,
    pub class_name: String,
    pub subject_id: String,
    pub chapters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarksRow {
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: f64,
    pub status: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceRow {
    pub student_id: String,
    pub subject_id: String,
    pub date: String,
    pub period: u32,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeRow {
    pub id: String,
    pub class_name: String,
    pub fee_type: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeworkRow {
    pub id: String,
    pub class_name: String,
    pub section: Option<String>,
    pub subject_id: String,
    pub teacher_id: String,
    pub assigned_date: String,
    pub due_date: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_sha256: String,
    pub role: String,
    pub student_id: Option<String>,
    pub teacher_id: Option<String>,
}
