use crate::addr::Address;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Opens (or initializes) a ledger workspace. A fresh database requires
/// `adminAddress`, which is fixed for the lifetime of the ledger; reopening
/// with a different one is rejected.
fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let requested_admin = match req.params.get("adminAddress").and_then(|v| v.as_str()) {
        None => None,
        Some(raw) => match Address::parse(raw) {
            Ok(a) => Some(a),
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    let stored_admin = match ledger::admin_address(&conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_failed", e.to_string(), None),
    };
    let admin = match (stored_admin, requested_admin) {
        (Some(stored), Some(requested)) => {
            if stored != requested {
                return err(
                    &req.id,
                    "admin_immutable",
                    "admin identity is fixed at workspace initialization",
                    None,
                );
            }
            stored
        }
        (Some(stored), None) => stored,
        (None, Some(requested)) => {
            if let Err(e) = ledger::set_admin_if_absent(&conn, &requested) {
                return err(&req.id, "db_failed", e.to_string(), None);
            }
            requested
        }
        (None, None) => {
            return err(
                &req.id,
                "bad_params",
                "adminAddress is required for a new workspace",
                None,
            );
        }
    };

    state.workspace = Some(path.clone());
    state.db = Some(conn);
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "adminAddress": admin.as_str(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
