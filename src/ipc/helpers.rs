use rusqlite::Connection;

use crate::error::Error;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::session::Identity;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(|| HandlerErr {
        code: "database_unavailable",
        message: "The response store is temporarily unavailable. Please try again.".to_string(),
        details: None,
    })
}

pub fn require_instructor(who: &Identity) -> Result<(), HandlerErr> {
    if who.is_instructor() {
        Ok(())
    } else {
        Err(Error::InstructorRequired.into())
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    get_opt_str(params, key).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("missing {}", key),
        details: None,
    })
}

/// Not trimmed; ids must match the catalog exactly.
/// Blank strings read as absent.
pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

pub fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params.get(key).and_then(|v| v.as_bool()).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("{} must be true or false", key),
        details: None,
    })
}

pub fn get_opt_usize(params: &serde_json::Value, key: &str) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("{} must be a non-negative integer", key),
                details: None,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_not_trimmed() {
        let params = json!({ "questionId": " Q1 ", "lecture": "   " });
        assert_eq!(get_opt_str(&params, "questionId").as_deref(), Some(" Q1 "));
        assert_eq!(get_opt_str(&params, "lecture"), None);
        assert_eq!(get_required_str(&params, "lecture").err().map(|e| e.code), Some("bad_params"));
    }

    #[test]
    fn limits_must_be_non_negative_integers() {
        assert_eq!(get_opt_usize(&json!({ "limit": 5 }), "limit").ok(), Some(Some(5)));
        assert_eq!(get_opt_usize(&json!({}), "limit").ok(), Some(None));
        assert_eq!(
            get_opt_usize(&json!({ "limit": -1 }), "limit").err().map(|e| e.code),
            Some("bad_params")
        );
    }
}
