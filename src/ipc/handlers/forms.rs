use super::{
    form_details_json, get_address_list, get_required_addr, get_required_bool, get_required_i64,
    get_required_str, now_ts, HandlerErr,
};
use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::Connection;
use serde_json::json;

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = get_required_addr(params, "caller")?;
    let course_id = get_required_i64(params, "courseId")?;
    let students = get_address_list(params, "students")?;
    let description = get_required_str(params, "description")?;
    let details = ledger::create_form(conn, &caller, course_id, students, &description, now_ts())
        .map_err(|e| HandlerErr {
            code: e.code(),
            message: e.to_string(),
        })?;
    Ok(form_details_json(&details))
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match get_required_addr(&req.params, "caller") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let form_id = match get_required_i64(&req.params, "formId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let attended = match get_required_bool(&req.params, "attended") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::submit_attendance(conn, &caller, form_id, attended, now_ts()) {
        Ok(details) => ok(&req.id, form_details_json(&details)),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match get_required_addr(&req.params, "caller") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let form_id = match get_required_i64(&req.params, "formId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::close_form(conn, &caller, form_id, now_ts()) {
        Ok(details) => ok(&req.id, form_details_json(&details)),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let form_id = match get_required_i64(&req.params, "formId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::form_details(conn, form_id) {
        Ok(details) => ok(&req.id, form_details_json(&details)),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_enrolled_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let form_id = match get_required_i64(&req.params, "formId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::enrolled_students(conn, form_id) {
        Ok(students) => {
            let rows: Vec<&str> = students.iter().map(|a| a.as_str()).collect();
            ok(&req.id, json!({ "students": rows }))
        }
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_student_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let form_id = match get_required_i64(&req.params, "formId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::student_status(conn, form_id, &address) {
        Ok(st) => ok(
            &req.id,
            json!({
                "hasResponded": st.has_responded,
                "isPresent": st.present,
            }),
        ),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_list_for_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match get_required_i64(&req.params, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::form_ids_for_course(conn, course_id) {
        Ok(ids) => ok(&req.id, json!({ "formIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_list_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::forms_for_student(conn, &address) {
        Ok(ids) => ok(&req.id, json!({ "formIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_open_for_student_in_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let course_id = match get_required_i64(&req.params, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::open_forms_for_student_in_course(conn, &address, course_id) {
        Ok(ids) => ok(&req.id, json!({ "formIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_list_for_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::forms_for_teacher(conn, &address) {
        Ok(ids) => ok(&req.id, json!({ "formIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_completed_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::completed_forms_for_student(conn, &address) {
        Ok(ids) => ok(&req.id, json!({ "formIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "forms.create" => Some(handle_create(state, req)),
        "forms.submit" => Some(handle_submit(state, req)),
        "forms.close" => Some(handle_close(state, req)),
        "forms.get" => Some(handle_get(state, req)),
        "forms.enrolledStudents" => Some(handle_enrolled_students(state, req)),
        "forms.studentStatus" => Some(handle_student_status(state, req)),
        "forms.listForCourse" => Some(handle_list_for_course(state, req)),
        "forms.listForStudent" => Some(handle_list_for_student(state, req)),
        "forms.openForStudentInCourse" => Some(handle_open_for_student_in_course(state, req)),
        "forms.listForTeacher" => Some(handle_list_for_teacher(state, req)),
        "forms.completedForStudent" => Some(handle_completed_for_student(state, req)),
        _ => None,
    }
}
