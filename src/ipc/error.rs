use serde_json::json;
use tracing::warn;

use crate::error::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<Error> for HandlerErr {
    fn from(e: Error) -> Self {
        if let Error::DatabaseUnavailable(inner) = &e {
            warn!(error = %inner, "store request failed");
        }
        let details = match &e {
            Error::UnknownQuestion {
                lecture_id,
                question_id,
            } => Some(json!({ "lecture": lecture_id, "questionId": question_id })),
            Error::UnknownLecture(lecture_id) => Some(json!({ "lecture": lecture_id })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.user_message(),
            details,
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        Error::from(e).into()
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
