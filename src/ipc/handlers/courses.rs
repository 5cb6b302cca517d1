use super::{get_required_addr, get_required_i64, get_required_str, now_ts, HandlerErr};
use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, Course};
use rusqlite::Connection;
use serde_json::json;

fn course_json(c: &Course) -> serde_json::Value {
    json!({
        "courseId": c.course_id,
        "name": c.name,
        "teacher": c.teacher.as_str(),
        "isActive": c.active,
        "createdAt": c.created_at,
        "formIds": c.form_ids,
    })
}

fn add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = get_required_addr(params, "caller")?;
    let name = get_required_str(params, "name")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "name must not be empty".to_string(),
        });
    }
    let course = ledger::add_course(conn, &caller, name, now_ts()).map_err(|e| HandlerErr {
        code: e.code(),
        message: e.to_string(),
    })?;
    Ok(course_json(&course))
}

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match add(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match get_required_i64(&req.params, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::get_course(conn, course_id) {
        Ok(course) => ok(&req.id, course_json(&course)),
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
    match ledger::active_course_ids_for_teacher(conn, &address) {
        Ok(ids) => ok(&req.id, json!({ "courseIds": ids })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_deactivate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match get_required_addr(&req.params, "caller") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let course_id = match get_required_i64(&req.params, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::deactivate_course(conn, &caller, course_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.add" => Some(handle_add(state, req)),
        "courses.get" => Some(handle_get(state, req)),
        "courses.listForTeacher" => Some(handle_list_for_teacher(state, req)),
        "courses.deactivate" => Some(handle_deactivate(state, req)),
        _ => None,
    }
}
