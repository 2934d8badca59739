use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{} succeeded: {}", method, value);
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn str_at(v: &serde_json::Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, v))
        .to_string()
}

struct Seeded {
    admin: String,
    student_a: String,
    student_b: String,
    subject: String,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &Path) -> Seeded {
    let _ = request_ok(stdin, reader, "s1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let _ = request_ok(stdin, reader, "s2", "auth.bootstrap", json!({ "username": "admin", "password": "admin-pass" }));
    let login = request_ok(stdin, reader, "s3", "auth.login", json!({ "username": "admin", "password": "admin-pass" }));
    let admin = str_at(&login, "/sessionToken");

    let a = request_ok(
        stdin,
        reader,
        "s4",
        "students.create",
        json!({ "sessionToken": admin, "fullName": "Asha Rao", "className": "10th", "section": "a", "rollNo": 1 }),
    );
    let b = request_ok(
        stdin,
        reader,
        "s5",
        "students.create",
        json!({ "sessionToken": admin, "fullName": "Ben Das", "className": "9-B", "rollNo": 4 }),
    );
    let teacher = request_ok(stdin, reader, "s6", "teachers.create", json!({ "sessionToken": admin, "fullName": "R. Iyer" }));
    let subject = request_ok(stdin, reader, "s7", "subjects.create", json!({ "sessionToken": admin, "name": "Science" }));
    let teacher_id = str_at(&teacher, "/teacherId");
    let subject_id = str_at(&subject, "/subjectId");
    let _ = request_ok(
        stdin,
        reader,
        "s8",
        "teacherSubjects.assign",
        json!({ "sessionToken": admin, "teacherId": teacher_id, "subjectId": subject_id, "className": "10-A" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s9",
        "users.create",
        json!({ "sessionToken": admin, "username": "parent-a", "password": "parent-pass", "role": "parent", "studentId": str_at(&a, "/studentId") }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s10",
        "users.create",
        json!({ "sessionToken": admin, "username": "iyer", "password": "teacher-pass", "role": "teacher", "teacherId": teacher_id }),
    );

    Seeded {
        admin,
        student_a: str_at(&a, "/studentId"),
        student_b: str_at(&b, "/studentId"),
        subject: subject_id,
    }
}

#[test]
fn parent_sessions_are_pinned_to_their_student() {
    let workspace = temp_dir("schoold-parent-scope");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "username": "parent-a", "password": "parent-pass" }),
    );
    let parent = str_at(&login, "/sessionToken");
    assert_eq!(str_at(&login, "/session/studentId"), seeded.student_a);

    // Asking for another class still yields the bound student's class.
    let tt = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.open",
        json!({ "sessionToken": parent, "classLabel": "9", "section": "B" }),
    );
    assert_eq!(tt.pointer("/class/grade").and_then(|v| v.as_u64()), Some(10));
    assert_eq!(tt.pointer("/class/section").and_then(|v| v.as_str()), Some("A"));

    assert_eq!(
        error_code(&mut stdin, &mut reader, "3", "marks.reportCard", json!({ "sessionToken": parent, "studentId": seeded.student_b })),
        "no_scope"
    );
    let own = request_ok(&mut stdin, &mut reader, "4", "marks.reportCard", json!({ "sessionToken": parent }));
    assert_eq!(str_at(&own, "/student/studentId"), seeded.student_a);

    assert_eq!(
        error_code(&mut stdin, &mut reader, "5", "students.create", json!({ "sessionToken": parent, "fullName": "X", "className": "10" })),
        "forbidden"
    );
    assert_eq!(
        error_code(
            &mut stdin,
            &mut reader,
            "6",
            "marks.roster",
            json!({ "sessionToken": parent, "examId": "e", "subjectId": seeded.subject, "classLabel": "10-A" })
        ),
        "forbidden"
    );
    assert_eq!(
        error_code(&mut stdin, &mut reader, "7", "exams.list", json!({ "sessionToken": parent, "sharedBy": ["10", "9"] })),
        "forbidden"
    );
}

#[test]
fn teachers_see_only_assigned_classes() {
    let workspace = temp_dir("schoold-teacher-scope");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "username": "iyer", "password": "teacher-pass" }),
    );
    let teacher = str_at(&login, "/sessionToken");

    let own = request_ok(&mut stdin, &mut reader, "2", "timetable.open", json!({ "sessionToken": teacher }));
    assert_eq!(str_at(&own, "/kind"), "teacher");
    assert_eq!(str_at(&own, "/teacherName"), "R. Iyer");

    let _ = request_ok(&mut stdin, &mut reader, "3", "fees.open", json!({ "sessionToken": teacher, "classLabel": "10th-A" }));
    assert_eq!(
        error_code(&mut stdin, &mut reader, "4", "fees.open", json!({ "sessionToken": teacher, "classLabel": "9", "section": "B" })),
        "no_scope"
    );
    assert_eq!(
        error_code(&mut stdin, &mut reader, "5", "attendance.summary", json!({ "sessionToken": teacher, "studentId": seeded.student_b })),
        "no_scope"
    );
    assert_eq!(
        error_code(&mut stdin, &mut reader, "6", "fees.open", json!({ "sessionToken": teacher, "classLabel": "Nursery" })),
        "unresolved_identity"
    );
}

#[test]
fn section_teachers_cannot_widen_to_the_whole_grade() {
    let workspace = temp_dir("schoold-widened-class");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    let other_section = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "sessionToken": seeded.admin, "fullName": "Chen Wu", "className": "10", "section": "B", "rollNo": 2 }),
    );
    let student_c = str_at(&other_section, "/studentId");
    let exam = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exams.create",
        json!({ "sessionToken": seeded.admin, "name": "Unit Test", "classes": ["10"] }),
    );
    let exam_id = str_at(&exam, "/examId");
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "iyer", "password": "teacher-pass" }),
    );
    let teacher = str_at(&login, "/sessionToken");

    let grade = json!({ "sessionToken": teacher, "examId": exam_id, "subjectId": seeded.subject, "classLabel": "10" });
    assert_eq!(error_code(&mut stdin, &mut reader, "4", "marks.roster", grade.clone()), "no_scope");

    let mut submit = grade.clone();
    submit["entries"] = json!([{ "studentId": student_c, "marksObtained": 90 }]);
    assert_eq!(error_code(&mut stdin, &mut reader, "5", "marks.submit", submit), "no_scope");

    assert_eq!(
        error_code(
            &mut stdin,
            &mut reader,
            "6",
            "attendance.mark",
            json!({
                "sessionToken": teacher,
                "classLabel": "10th",
                "subjectId": seeded.subject,
                "date": "2024-09-02",
                "period": 1,
                "records": [{ "studentId": student_c, "status": "absent" }]
            })
        ),
        "no_scope"
    );
    assert_eq!(
        error_code(
            &mut stdin,
            &mut reader,
            "7",
            "homework.create",
            json!({
                "sessionToken": teacher,
                "classLabel": "10",
                "subjectId": seeded.subject,
                "assignedDate": "2024-09-02",
                "dueDate": "2024-09-09",
                "title": "Grade-wide reading"
            })
        ),
        "no_scope"
    );

    // The assigned section still works and holds only its own students.
    let mut own = grade.clone();
    own["section"] = json!("A");
    let roster = request_ok(&mut stdin, &mut reader, "8", "marks.roster", own);
    let ids: Vec<String> = roster
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows")
        .iter()
        .map(|r| str_at(r, "/studentId"))
        .collect();
    assert_eq!(ids, vec![seeded.student_a.clone()]);

    // Nothing leaked into section B.
    let b_roster = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "marks.roster",
        json!({ "sessionToken": seeded.admin, "examId": exam_id, "subjectId": seeded.subject, "classLabel": "10-B" }),
    );
    assert_eq!(str_at(&b_roster, "/rows/0/studentId"), student_c);
    assert_eq!(str_at(&b_roster, "/rows/0/status"), "pending");
    let homework = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "homework.list",
        json!({ "sessionToken": seeded.admin, "classLabel": "10-B" }),
    );
    assert_eq!(homework.get("items").and_then(|v| v.as_array()).map(|a| a.len()), Some(0));
}

#[test]
fn credentials_and_session_lifecycle() {
    let workspace = temp_dir("schoold-session-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader, &workspace);

    assert_eq!(
        error_code(&mut stdin, &mut reader, "1", "auth.login", json!({ "username": "admin", "password": "nope-nope" })),
        "bad_credentials"
    );
    assert_eq!(
        error_code(&mut stdin, &mut reader, "2", "auth.bootstrap", json!({ "username": "root", "password": "root-pass" })),
        "forbidden"
    );
    assert_eq!(
        error_code(
            &mut stdin,
            &mut reader,
            "3",
            "users.create",
            json!({ "sessionToken": seeded.admin, "username": "admin", "password": "another-pass", "role": "admin" })
        ),
        "conflict"
    );
    assert_eq!(
        error_code(&mut stdin, &mut reader, "4", "fees.open", json!({ "classLabel": "10" })),
        "no_session"
    );

    // Reopening the workspace drops live sessions.
    let _ = request_ok(&mut stdin, &mut reader, "5", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    assert_eq!(
        error_code(&mut stdin, &mut reader, "6", "session.get", json!({ "sessionToken": seeded.admin })),
        "no_session"
    );
}
