use super::error::{err, respond};
use super::handlers;
use super::types::{AppState, Request};
use crate::session::{self, Identity};
use tracing::debug;

/// Role-dispatched page model. A wrong passcode falls back to the student view.
fn handle_view(state: &AppState, req: &Request, who: &Identity) -> serde_json::Value {
    let result = if who.is_instructor() {
        handlers::instructor::instructor_view(state, who)
    } else {
        handlers::student::student_view(state, who)
    };
    respond(&req.id, result)
}

pub fn handle_request(state: &AppState, req: Request) -> serde_json::Value {
    let who = session::resolve(&req.session, state.config.instructor_key());
    debug!(id = %req.id, method = %req.method, role = ?who.role, "request");

    if req.method == "view" {
        return handle_view(state, &req, &who);
    }
    if let Some(resp) = handlers::core::try_handle(state, &req, &who) {
        return resp;
    }
    if let Some(resp) = handlers::student::try_handle(state, &req, &who) {
        return resp;
    }
    if let Some(resp) = handlers::instructor::try_handle(state, &req, &who) {
        return resp;
    }
    if let Some(resp) = handlers::results::try_handle(state, &req, &who) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
