use crate::db;
use crate::flow;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_opt_str, get_required_bool, get_required_str, require_db, require_instructor};
use crate::ipc::types::{AppState, Request};
use crate::results;
use crate::session::Identity;
use serde_json::json;

const LATEST_ANSWERS_SHOWN: usize = 20;

pub(crate) fn instructor_view(state: &AppState, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;

    let lectures: Vec<serde_json::Value> = state
        .catalog
        .lectures()
        .map(|l| json!({ "id": l.id, "title": l.title, "problem": l.problem }))
        .collect();

    let lecture_id = flow::current_lecture(conn, &state.catalog)?;
    let lecture = lecture_id.as_deref().and_then(|id| state.catalog.lecture(id));
    let pointer = match &lecture_id {
        Some(id) => db::active_pointer(conn, id)?,
        None => db::ActivePointer::default(),
    };

    let questions: Vec<serde_json::Value> = lecture
        .map(|l| {
            l.questions
                .iter()
                .map(|q| {
                    json!({
                        "questionId": q.question_id,
                        "type": q.kind,
                        "prompt": q.prompt,
                        "options": q.options,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let live = match (lecture, pointer.question_id.as_deref()) {
        (Some(l), Some(qid)) => l.question(qid),
        _ => None,
    };
    let live_results = match (live, lecture_id.as_deref()) {
        (Some(q), Some(lid)) => {
            let count = db::responses_for_question(conn, lid, &q.question_id)?.len();
            if q.is_multiple_choice() {
                Some(json!({
                    "questionId": q.question_id,
                    "type": q.kind,
                    "prompt": q.prompt,
                    "responseCount": count,
                    "tally": results::tally(conn, lid, q)?,
                }))
            } else {
                Some(json!({
                    "questionId": q.question_id,
                    "type": q.kind,
                    "prompt": q.prompt,
                    "responseCount": count,
                    "latest": results::list(conn, lid, &q.question_id, Some(LATEST_ANSWERS_SHOWN))?,
                }))
            }
        }
        _ => None,
    };

    let export_rows = match lecture_id.as_deref() {
        Some(lid) => db::count_responses_for_lecture(conn, lid)?,
        None => 0,
    };

    Ok(json!({
        "role": who.role,
        "course": state.config.course,
        "lectures": lectures,
        "currentLecture": lecture_id,
        "title": lecture.and_then(|l| l.title.clone()),
        "problem": lecture.and_then(|l| l.problem.clone()),
        "questions": questions,
        "activeQuestionId": pointer.question_id,
        "resultsVisible": pointer.results_visible,
        "live": live_results,
        "exportRows": export_rows,
    }))
}

fn handle_select_lecture(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;
    let lecture = get_required_str(&req.params, "lecture")?;
    let changed = flow::select_lecture(conn, &state.catalog, &lecture)?;
    Ok(json!({ "currentLecture": lecture, "changed": changed }))
}

fn handle_advance(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;
    let question_id = get_required_str(&req.params, "questionId")?;
    let lecture = get_opt_str(&req.params, "lecture");
    let lecture = flow::advance(conn, &state.catalog, lecture.as_deref(), &question_id)?;
    Ok(json!({ "lecture": lecture, "activeQuestionId": question_id }))
}

fn handle_clear_active(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;
    let lecture = get_opt_str(&req.params, "lecture");
    let lecture = flow::clear_active(conn, &state.catalog, lecture.as_deref())?;
    Ok(json!({ "lecture": lecture, "activeQuestionId": null }))
}

fn handle_set_results_visible(
    state: &AppState,
    req: &Request,
    who: &Identity,
) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;
    let visible = get_required_bool(&req.params, "visible")?;
    let lecture = get_opt_str(&req.params, "lecture");
    let lecture = flow::set_results_visible(conn, &state.catalog, lecture.as_deref(), visible)?;
    Ok(json!({ "lecture": lecture, "resultsVisible": visible }))
}

pub fn try_handle(state: &AppState, req: &Request, who: &Identity) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "instructor.view" => instructor_view(state, who),
        "instructor.selectLecture" => handle_select_lecture(state, req, who),
        "instructor.advance" => handle_advance(state, req, who),
        "instructor.clearActive" => handle_clear_active(state, req, who),
        "instructor.setResultsVisible" => handle_set_results_visible(state, req, who),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
