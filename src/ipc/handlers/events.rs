use crate::ipc::error::{err, ledger_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use serde_json::json;

/// Cursor-based read of the notification log. Dashboards poll with the last
/// seq they saw; ordering within and across operations is the commit order.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let after_seq = req.params.get("afterSeq").and_then(|v| v.as_i64()).unwrap_or(0);
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(500)
        .clamp(1, 5000);

    match ledger::events_after(conn, after_seq, limit) {
        Ok(events) => {
            let rows: Vec<serde_json::Value> = events
                .iter()
                .map(|e| {
                    json!({
                        "seq": e.seq,
                        "kind": e.kind,
                        "at": e.at,
                        "payload": e.payload,
                    })
                })
                .collect();
            let next_seq = events.last().map(|e| e.seq).unwrap_or(after_seq);
            ok(&req.id, json!({ "events": rows, "nextSeq": next_seq }))
        }
        Err(e) => ledger_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
