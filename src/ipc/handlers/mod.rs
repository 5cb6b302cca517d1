pub mod backup;
pub mod core;
pub mod courses;
pub mod events;
pub mod forms;
pub mod teachers;

use crate::addr::Address;
use serde_json::json;

pub(crate) struct HandlerErr {
    pub code: &'static str,
    pub message: String,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        super::error::err(id, self.code, self.message, None)
    }

    fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
        }
    }
}

pub(crate) fn get_required_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_required_addr(
    params: &serde_json::Value,
    key: &str,
) -> Result<Address, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Address::parse(&raw).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

pub(crate) fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_address_list(
    params: &serde_json::Value,
    key: &str,
) -> Result<Vec<Address>, HandlerErr> {
    let Some(raw) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    let mut out = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "{} entries must be address strings",
                key
            )));
        };
        out.push(Address::parse(s).map_err(|e| HandlerErr::bad_params(e.to_string()))?);
    }
    Ok(out)
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn form_details_json(d: &crate::ledger::FormDetails) -> serde_json::Value {
    // Present percentage is the only derived analytic exposed anywhere.
    let present_percent = if d.enrolled_count > 0 {
        (d.present_count as f64) * 100.0 / (d.enrolled_count as f64)
    } else {
        0.0
    };
    json!({
        "formId": d.form_id,
        "courseId": d.course_id,
        "teacher": d.teacher.as_str(),
        "description": d.description,
        "status": d.status.as_str(),
        "presentCount": d.present_count,
        "enrolledCount": d.enrolled_count,
        "presentPercent": present_percent,
        "openTimestamp": d.opened_at,
        "closeTimestamp": d.closed_at,
    })
}
