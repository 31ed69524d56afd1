use crate::db;
use crate::flow;
use crate::ipc::error::{ok, respond, HandlerErr};
use crate::ipc::helpers::{require_db, require_instructor};
use crate::ipc::types::{AppState, Request};
use crate::session::{requested_mode, Identity};
use serde_json::json;

fn handle_health(state: &AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "course": state.config.course,
            "lectures": state.catalog.lecture_ids().len(),
            "database": state.db.is_some(),
        }),
    )
}

fn handle_session_resolve(req: &Request, who: &Identity) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "mode": requested_mode(&req.session),
            "role": who.role,
            "studentId": who.student_id,
            "instructorLocked": who.instructor_locked,
        }),
    )
}

fn handle_state_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let lecture = flow::current_lecture(conn, &state.catalog)?;
    let pointer = match &lecture {
        Some(id) => db::active_pointer(conn, id)?,
        None => db::ActivePointer::default(),
    };
    Ok(json!({
        "currentLecture": lecture,
        "activeQuestionId": pointer.question_id,
        "resultsVisible": pointer.results_visible,
    }))
}

fn handle_lectures_list(state: &AppState, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let lectures: Vec<serde_json::Value> = state
        .catalog
        .lectures()
        .map(|l| {
            json!({
                "id": l.id,
                "title": l.title,
                "questionCount": l.questions.len(),
                "problem": l.problem,
            })
        })
        .collect();
    Ok(json!({ "lectures": lectures }))
}

pub fn try_handle(state: &AppState, req: &Request, who: &Identity) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "session.resolve" => Some(handle_session_resolve(req, who)),
        "state.get" => Some(respond(&req.id, handle_state_get(state))),
        "lectures.list" => Some(respond(&req.id, handle_lectures_list(state, who))),
        _ => None,
    }
}
