use crate::db;
use crate::flow::{self, Submission, SubmitRequest};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_opt_str, get_required_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::results;
use crate::session::{normalize_student_id, Identity};
use serde_json::json;

fn handle_check_in(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let raw = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let Some(student_id) = normalize_student_id(raw) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "Please enter your student id.".to_string(),
            details: None,
        });
    };
    Ok(json!({ "studentId": student_id }))
}

pub(crate) fn student_view(state: &AppState, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let lecture_id = flow::current_lecture(conn, &state.catalog)?;
    let lecture = lecture_id.as_deref().and_then(|id| state.catalog.lecture(id));
    let pointer = match &lecture_id {
        Some(id) => db::active_pointer(conn, id)?,
        None => db::ActivePointer::default(),
    };
    let live = match (lecture, pointer.question_id.as_deref()) {
        (Some(l), Some(qid)) => l.question(qid),
        _ => None,
    };

    let already_submitted = match (live, lecture_id.as_deref(), who.student_id.as_deref()) {
        (Some(q), Some(lid), Some(sid)) => db::has_response(conn, lid, &q.question_id, sid)?,
        _ => false,
    };

    let results = match (live, lecture_id.as_deref()) {
        (Some(q), Some(lid)) if pointer.results_visible && q.is_multiple_choice() => {
            Some(results::tally(conn, lid, q)?)
        }
        _ => None,
    };

    let message = if who.student_id.is_none() {
        Some("Enter your student id once to check in.")
    } else if live.is_none() {
        Some("No question is live yet. Please wait.")
    } else if already_submitted {
        Some(flow::Rejection::AlreadySubmitted.message())
    } else {
        None
    };

    Ok(json!({
        "role": who.role,
        "instructorLocked": who.instructor_locked,
        "course": state.config.course,
        "lecture": lecture_id,
        "title": lecture.and_then(|l| l.title.clone()),
        "studentId": who.student_id,
        "checkedIn": who.student_id.is_some(),
        "question": live.map(|q| json!({
            "questionId": q.question_id,
            "type": q.kind,
            "prompt": q.prompt,
            "options": q.options,
        })),
        "alreadySubmitted": already_submitted,
        "resultsVisible": pointer.results_visible,
        "results": results,
        "message": message,
    }))
}

fn handle_submit(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let question_id = get_required_str(&req.params, "questionId")?;
    let lecture_id = get_opt_str(&req.params, "lecture");
    let answer = req
        .params
        .get("answer")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let outcome = flow::submit(
        conn,
        &state.catalog,
        &state.config.course,
        SubmitRequest {
            lecture_id: lecture_id.as_deref(),
            question_id: &question_id,
            student_id: who.student_id.as_deref().unwrap_or(""),
            answer,
        },
    )?;

    Ok(match outcome {
        Submission::Accepted { submitted_at } => json!({
            "status": "accepted",
            "accepted": true,
            "submittedAt": submitted_at,
            "message": "Saved.",
        }),
        Submission::Rejected(reason) => json!({
            "status": reason,
            "accepted": false,
            "message": reason.message(),
        }),
    })
}

pub fn try_handle(state: &AppState, req: &Request, who: &Identity) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.checkIn" => Some(respond(&req.id, handle_check_in(req))),
        "student.view" => Some(respond(&req.id, student_view(state, who))),
        "responses.submit" => Some(respond(&req.id, handle_submit(state, req, who))),
        _ => None,
    }
}
