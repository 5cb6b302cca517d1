use super::{get_required_addr, now_ts, HandlerErr};
use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use rusqlite::Connection;
use serde_json::json;

fn register(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = get_required_addr(params, "caller")?;
    let address = get_required_addr(params, "address")?;
    let record = ledger::register_teacher(conn, &caller, &address, now_ts())
        .map_err(|e| HandlerErr {
            code: e.code(),
            message: e.to_string(),
        })?;
    Ok(json!({
        "address": record.address.as_str(),
        "registeredAt": record.registered_at,
        "isActive": record.active,
    }))
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match register(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_unregister(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let caller = match get_required_addr(&req.params, "caller") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::unregister_teacher(conn, &caller, &address) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_is_registered(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let address = match get_required_addr(&req.params, "address") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match ledger::is_teacher_registered(conn, &address) {
        Ok(registered) => ok(&req.id, json!({ "registered": registered })),
        Err(e) => ledger_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match ledger::list_teachers(conn) {
        Ok(teachers) => {
            let rows: Vec<serde_json::Value> = teachers
                .iter()
                .map(|t| {
                    json!({
                        "address": t.address.as_str(),
                        "registeredAt": t.registered_at,
                        "isActive": t.active,
                    })
                })
                .collect();
            ok(&req.id, json!({ "teachers": rows }))
        }
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.register" => Some(handle_register(state, req)),
        "teachers.unregister" => Some(handle_unregister(state, req)),
        "teachers.isRegistered" => Some(handle_is_registered(state, req)),
        "teachers.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
