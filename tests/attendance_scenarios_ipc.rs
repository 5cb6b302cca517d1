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
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn expect_ok(value: &serde_json::Value, what: &str) -> serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        what,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

fn expect_err_code(value: &serde_json::Value, code: &str, what: &str) {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        what,
        value
    );
    let got = value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    assert_eq!(got, code, "{}: wrong error code in {}", what, value);
}

fn addr(n: u8) -> String {
    format!("0x{:040x}", n)
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Sidecar {
    fn start(workspace: &PathBuf, admin: &str) -> Sidecar {
        let (child, mut stdin, mut reader) = spawn_sidecar();
        let resp = request(
            &mut stdin,
            &mut reader,
            "ws",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy(), "adminAddress": &admin }),
        );
        expect_ok(&resp, "workspace.select");
        Sidecar {
            child,
            stdin,
            reader,
            next_id: 1,
        }
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = format!("r{}", self.next_id);
        self.next_id += 1;
        request(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

#[test]
fn scenario_register_teacher_and_add_course() {
    let workspace = temp_dir("attendanced-scenario-a");
    let admin = addr(1);
    let teacher1 = addr(2);
    let mut s = Sidecar::start(&workspace, &admin);

    let resp = s.call(
        "teachers.register",
        json!({ "caller": &admin, "address": &teacher1 }),
    );
    expect_ok(&resp, "register teacher1");

    let resp = s.call("courses.add", json!({ "caller": &teacher1, "name": "CS101" }));
    let course = expect_ok(&resp, "addCourse");
    assert_eq!(course["courseId"], 1);
    assert_eq!(course["name"], "CS101");
    assert_eq!(course["teacher"], teacher1);

    let resp = s.call("events.list", json!({}));
    let result = expect_ok(&resp, "events.list");
    let events = result["events"].as_array().expect("events array");
    let added = events
        .iter()
        .find(|e| e["kind"] == "CourseAdded")
        .expect("CourseAdded event");
    assert_eq!(added["payload"]["courseId"], 1);
    assert_eq!(added["payload"]["name"], "CS101");
    assert_eq!(added["payload"]["teacher"], teacher1);

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn scenario_non_admin_cannot_register() {
    let workspace = temp_dir("attendanced-scenario-b");
    let admin = addr(1);
    let non_admin = addr(9);
    let teacher2 = addr(3);
    let mut s = Sidecar::start(&workspace, &admin);

    let resp = s.call(
        "teachers.register",
        json!({ "caller": &non_admin, "address": &teacher2 }),
    );
    expect_err_code(&resp, "only_admin", "non-admin register");

    let resp = s.call("teachers.isRegistered", json!({ "address": &teacher2 }));
    let result = expect_ok(&resp, "isRegistered");
    assert_eq!(result["registered"], false);

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

fn setup_form(s: &mut Sidecar, admin: &str, teacher: &str, students: &[String]) -> (i64, i64) {
    let resp = s.call(
        "teachers.register",
        json!({ "caller": &admin, "address": teacher }),
    );
    expect_ok(&resp, "register");
    let resp = s.call("courses.add", json!({ "caller": teacher, "name": "Science101" }));
    let course_id = expect_ok(&resp, "addCourse")["courseId"].as_i64().unwrap();
    let resp = s.call(
        "forms.create",
        json!({
            "caller": teacher,
            "courseId": course_id,
            "students": students,
            "description": "Lecture 1"
        }),
    );
    let form_id = expect_ok(&resp, "createForm")["formId"].as_i64().unwrap();
    (course_id, form_id)
}

#[test]
fn scenario_submission_first_write_wins() {
    let workspace = temp_dir("attendanced-scenario-c");
    let admin = addr(1);
    let teacher1 = addr(2);
    let student1 = addr(10);
    let student2 = addr(11);
    let mut s = Sidecar::start(&workspace, &admin);

    let (_cid, form_id) = setup_form(
        &mut s,
        &admin,
        &teacher1,
        &[student1.clone(), student2.clone()],
    );
    assert_eq!(form_id, 1);

    let resp = s.call("forms.get", json!({ "formId": form_id }));
    let form = expect_ok(&resp, "forms.get");
    assert_eq!(form["status"], "open");
    assert_eq!(form["enrolledCount"], 2);

    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student1, "formId": form_id, "attended": true }),
    );
    let form = expect_ok(&resp, "submit present");
    assert_eq!(form["presentCount"], 1);

    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student1, "formId": form_id, "attended": true }),
    );
    expect_err_code(&resp, "already_responded", "duplicate submit");

    let resp = s.call("forms.get", json!({ "formId": form_id }));
    assert_eq!(expect_ok(&resp, "forms.get")["presentCount"], 1);

    // Absent response is recorded but never moves the present counter.
    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student2, "formId": form_id, "attended": false }),
    );
    assert_eq!(expect_ok(&resp, "submit absent")["presentCount"], 1);
    let resp = s.call(
        "forms.studentStatus",
        json!({ "formId": form_id, "address": &student2 }),
    );
    let st = expect_ok(&resp, "studentStatus");
    assert_eq!(st["hasResponded"], true);
    assert_eq!(st["isPresent"], false);

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn scenario_close_is_terminal_and_emits_counts() {
    let workspace = temp_dir("attendanced-scenario-d");
    let admin = addr(1);
    let teacher1 = addr(2);
    let student1 = addr(10);
    let student2 = addr(11);
    let mut s = Sidecar::start(&workspace, &admin);

    let (_cid, form_id) = setup_form(
        &mut s,
        &admin,
        &teacher1,
        &[student1.clone(), student2.clone()],
    );
    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student1, "formId": form_id, "attended": true }),
    );
    expect_ok(&resp, "submit");

    let resp = s.call("forms.close", json!({ "caller": &teacher1, "formId": form_id }));
    let form = expect_ok(&resp, "close");
    assert_eq!(form["status"], "closed");
    assert_eq!(form["presentCount"], 1);
    assert_eq!(form["presentPercent"], 50.0);

    let resp = s.call("forms.close", json!({ "caller": &teacher1, "formId": form_id }));
    expect_err_code(&resp, "form_not_open", "double close");

    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student2, "formId": form_id, "attended": true }),
    );
    expect_err_code(&resp, "form_not_open", "submit after close");

    let resp = s.call("events.list", json!({}));
    let result = expect_ok(&resp, "events.list");
    let events = result["events"].as_array().expect("events array");
    let closed = events
        .iter()
        .find(|e| e["kind"] == "AttendanceFormClosed")
        .expect("AttendanceFormClosed event");
    assert_eq!(closed["payload"]["formId"], form_id);
    assert_eq!(closed["payload"]["presentCount"], 1);
    assert_eq!(closed["payload"]["enrolledCount"], 2);

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn scenario_non_enrolled_student_rejected() {
    let workspace = temp_dir("attendanced-scenario-e");
    let admin = addr(1);
    let teacher1 = addr(2);
    let student1 = addr(10);
    let student3 = addr(12);
    let mut s = Sidecar::start(&workspace, &admin);

    let (_cid, form_id) = setup_form(&mut s, &admin, &teacher1, &[student1]);

    let resp = s.call(
        "forms.submit",
        json!({ "caller": &student3, "formId": form_id, "attended": true }),
    );
    expect_err_code(&resp, "not_enrolled", "non-enrolled submit");

    let resp = s.call("forms.get", json!({ "formId": form_id }));
    assert_eq!(expect_ok(&resp, "forms.get")["presentCount"], 0);

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn form_ids_are_global_across_courses() {
    let workspace = temp_dir("attendanced-global-ids");
    let admin = addr(1);
    let teacher1 = addr(2);
    let student1 = addr(10);
    let mut s = Sidecar::start(&workspace, &admin);

    let resp = s.call(
        "teachers.register",
        json!({ "caller": &admin, "address": &teacher1 }),
    );
    expect_ok(&resp, "register");

    let resp = s.call("courses.add", json!({ "caller": &teacher1, "name": "History 101" }));
    let c1 = expect_ok(&resp, "course 1")["courseId"].as_i64().unwrap();
    let resp = s.call("courses.add", json!({ "caller": &teacher1, "name": "History 102" }));
    let c2 = expect_ok(&resp, "course 2")["courseId"].as_i64().unwrap();
    assert_eq!((c1, c2), (1, 2));

    let mut form_ids = Vec::new();
    for (course, desc) in [(c1, "Form A"), (c2, "Form B"), (c1, "Form C")] {
        let resp = s.call(
            "forms.create",
            json!({
                "caller": &teacher1,
                "courseId": course,
                "students": [student1.clone()],
                "description": desc
            }),
        );
        form_ids.push(expect_ok(&resp, desc)["formId"].as_i64().unwrap());
    }
    // Global counter: ids never restart per course.
    assert_eq!(form_ids, vec![1, 2, 3]);

    let resp = s.call("forms.listForCourse", json!({ "courseId": c1 }));
    assert_eq!(
        expect_ok(&resp, "listForCourse")["formIds"],
        json!([1, 3])
    );

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
