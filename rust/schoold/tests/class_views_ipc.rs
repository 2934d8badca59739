use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
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

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn str_at(v: &serde_json::Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", pointer, v))
        .to_string()
}

fn admin_session(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, prefix: &str) -> String {
    let workspace = temp_dir(prefix);
    let _ = request_ok(stdin, reader, "w", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let _ = request_ok(stdin, reader, "b", "auth.bootstrap", json!({ "username": "admin", "password": "admin-pass" }));
    let login = request_ok(stdin, reader, "l", "auth.login", json!({ "username": "admin", "password": "admin-pass" }));
    str_at(&login, "/sessionToken")
}

#[test]
fn fees_match_either_grade_spelling_and_flag_mixed_forms() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = admin_session(&mut stdin, &mut reader, "schoold-fees");

    for (i, (class, kind, amount)) in [("10th", "Tuition", 1200.0), ("10", "Lab", 300.0), ("9th", "Tuition", 900.0)]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("f{}", i),
            "fees.create",
            json!({ "sessionToken": token, "className": class, "feeType": kind, "amount": amount }),
        );
    }

    let fees = request_ok(&mut stdin, &mut reader, "1", "fees.open", json!({ "sessionToken": token, "classLabel": "10-B" }));
    assert_eq!(fees.get("total").and_then(|v| v.as_f64()), Some(1500.0));
    assert_eq!(fees.get("mixedForms").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(fees.get("lines").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));

    let nine = request_ok(&mut stdin, &mut reader, "2", "fees.open", json!({ "sessionToken": token, "classLabel": "9" }));
    assert_eq!(nine.get("total").and_then(|v| v.as_f64()), Some(900.0));
    assert_eq!(nine.get("mixedForms").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn timetable_grid_is_total_over_configured_days_and_periods() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = admin_session(&mut stdin, &mut reader, "schoold-timetable");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "sessionToken": token, "section": "timetable", "patch": { "days": ["monday", "Tue"], "periodsPerDay": 3 } }),
    );
    let subject = request_ok(&mut stdin, &mut reader, "2", "subjects.create", json!({ "sessionToken": token, "name": "Physics" }));
    let subject_id = str_at(&subject, "/subjectId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.setSlot",
        json!({ "sessionToken": token, "day": "Tue", "period": 2, "subjectId": subject_id, "className": "10th" }),
    );
    // Same cell again replaces rather than stacking a second slot.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.setSlot",
        json!({ "sessionToken": token, "day": "tuesday", "period": 2, "subjectId": subject_id, "className": "10" }),
    );
    assert_eq!(again.get("replaced").and_then(|v| v.as_bool()), Some(true));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.open",
        json!({ "sessionToken": token, "classLabel": "10", "section": "C" }),
    );
    let rows = view
        .pointer("/timetable/matrix/rows")
        .and_then(|v| v.as_array())
        .expect("rows");
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.get("cells").and_then(|v| v.as_array()).map(|c| c.len()), Some(3));
    }
    assert_eq!(str_at(&view, "/timetable/matrix/rows/0/key"), "Mon");
    assert!(view.pointer("/timetable/matrix/rows/0/cells/0/value").map_or(false, |v| v.is_null()));
    assert_eq!(
        str_at(&view, "/timetable/matrix/rows/1/cells/1/value/subjectName"),
        "Physics"
    );
    assert_eq!(view.pointer("/timetable/matrix/collisions").and_then(|v| v.as_u64()), Some(0));
}

#[test]
fn exam_entries_carry_syllabus_or_pending() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = admin_session(&mut stdin, &mut reader, "schoold-exams");

    let math = request_ok(&mut stdin, &mut reader, "1", "subjects.create", json!({ "sessionToken": token, "name": "Mathematics" }));
    let sci = request_ok(&mut stdin, &mut reader, "2", "subjects.create", json!({ "sessionToken": token, "name": "Science" }));
    let math_id = str_at(&math, "/subjectId");
    let sci_id = str_at(&sci, "/subjectId");
    let exam = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exams.create",
        json!({ "sessionToken": token, "name": "Final Exam", "classes": ["10th"], "startDate": "2025-03-01" }),
    );
    let exam_id = str_at(&exam, "/examId");
    for (id, subject, date) in [("4", &sci_id, "2025-03-04"), ("5", &math_id, "2025-03-02")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "exams.addSchedule",
            json!({ "sessionToken": token, "examId": exam_id, "subjectId": subject, "examDate": date, "className": "10" }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "syllabus.upsert",
        json!({ "sessionToken": token, "examName": "FINAL EXAM", "subjectId": math_id, "className": "10th", "chapters": ["Algebra"] }),
    );
    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "syllabus.upsert",
        json!({ "sessionToken": token, "examName": "final exam", "subjectId": math_id, "className": "10", "chapters": ["Algebra", "Trigonometry"] }),
    );
    assert_eq!(replaced.get("replaced").and_then(|v| v.as_bool()), Some(true));

    let view = request_ok(&mut stdin, &mut reader, "8", "exams.open", json!({ "sessionToken": token, "classLabel": "10-A" }));
    assert_eq!(str_at(&view, "/exams/0/examName"), "Final Exam");
    assert_eq!(str_at(&view, "/exams/0/entries/0/subjectName"), "Mathematics");
    assert_eq!(str_at(&view, "/exams/0/entries/0/syllabus/status"), "attached");
    assert_eq!(
        view.pointer("/exams/0/entries/0/syllabus/chapters")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(2)
    );
    assert_eq!(str_at(&view, "/exams/0/entries/1/syllabus/status"), "pending");

    let listed = request_ok(&mut stdin, &mut reader, "9", "exams.list", json!({ "sessionToken": token, "classLabel": "10" }));
    assert_eq!(str_at(&listed, "/exams/0/id"), exam_id);
    let shared = request_ok(&mut stdin, &mut reader, "10", "exams.list", json!({ "sessionToken": token, "sharedBy": ["10th", "9"] }));
    assert_eq!(shared.get("exams").and_then(|v| v.as_array()).map(|a| a.len()), Some(0));
}

#[test]
fn homework_and_attendance_follow_the_class_key() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let token = admin_session(&mut stdin, &mut reader, "schoold-homework");

    let teacher = request_ok(&mut stdin, &mut reader, "1", "teachers.create", json!({ "sessionToken": token, "fullName": "S. Khan" }));
    let subject = request_ok(&mut stdin, &mut reader, "2", "subjects.create", json!({ "sessionToken": token, "name": "English" }));
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "sessionToken": token, "fullName": "Asha Rao", "className": "8th", "section": "C", "rollNo": 5 }),
    );
    let teacher_id = str_at(&teacher, "/teacherId");
    let subject_id = str_at(&subject, "/subjectId");
    let student_id = str_at(&student, "/studentId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teacherSubjects.assign",
        json!({ "sessionToken": token, "teacherId": teacher_id, "subjectId": subject_id, "className": "8" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "users.create",
        json!({ "sessionToken": token, "username": "khan", "password": "teacher-pass", "role": "teacher", "teacherId": teacher_id }),
    );
    let login = request_ok(&mut stdin, &mut reader, "6", "auth.login", json!({ "username": "khan", "password": "teacher-pass" }));
    let khan = str_at(&login, "/sessionToken");

    for (id, title, due) in [("7", "Essay", "2024-09-20"), ("8", "Reading log", "2024-09-10")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "homework.create",
            json!({
                "sessionToken": khan,
                "classLabel": "8-C",
                "subjectId": subject_id,
                "assignedDate": "2024-09-02",
                "dueDate": due,
                "title": title
            }),
        );
    }
    let list = request_ok(&mut stdin, &mut reader, "9", "homework.list", json!({ "sessionToken": khan, "classLabel": "8th", "section": "c" }));
    assert_eq!(str_at(&list, "/items/0/title"), "Reading log");
    assert_eq!(str_at(&list, "/items/1/teacherName"), "S. Khan");
    let later = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "homework.list",
        json!({ "sessionToken": khan, "classLabel": "8-C", "dueFrom": "2024-09-15" }),
    );
    assert_eq!(later.get("items").and_then(|v| v.as_array()).map(|a| a.len()), Some(1));

    for (id, date, status) in [("11", "2024-09-02", "present"), ("12", "2024-09-03", "absent"), ("13", "2024-09-04", "holiday")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "attendance.mark",
            json!({
                "sessionToken": khan,
                "classLabel": "8-C",
                "subjectId": subject_id,
                "date": date,
                "period": 1,
                "records": [{ "studentId": student_id, "status": status }]
            }),
        );
    }
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.summary",
        json!({ "sessionToken": khan, "studentId": student_id }),
    );
    assert_eq!(summary.pointer("/overall/percent").and_then(|v| v.as_f64()), Some(50.0));
    assert_eq!(summary.pointer("/overall/holiday").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(str_at(&summary, "/bySubject/0/subjectName"), "English");
}
