use crate::db;
use crate::error::Error;
use crate::flow;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_opt_str, get_opt_usize, get_required_str, require_db, require_instructor};
use crate::ipc::types::{AppState, Request};
use crate::results;
use crate::session::Identity;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn lecture_param(state: &AppState, req: &Request) -> Result<String, HandlerErr> {
    let conn = require_db(state)?;
    match get_opt_str(&req.params, "lecture") {
        Some(id) if state.catalog.lecture(&id).is_some() => Ok(id),
        Some(id) => Err(Error::UnknownLecture(id).into()),
        None => flow::current_lecture(conn, &state.catalog)?.ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "no lecture is selected".to_string(),
            details: None,
        }),
    }
}

/// Students only see the tally of the live question, and only while the instructor shows results.
fn student_may_see_tally(state: &AppState, lecture_id: &str, question_id: &str) -> Result<bool, HandlerErr> {
    let conn = require_db(state)?;
    if flow::current_lecture(conn, &state.catalog)?.as_deref() != Some(lecture_id) {
        return Ok(false);
    }
    let pointer = db::active_pointer(conn, lecture_id)?;
    Ok(pointer.results_visible && pointer.question_id.as_deref() == Some(question_id))
}

fn handle_tally(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let question_id = get_required_str(&req.params, "questionId")?;
    let lecture_id = lecture_param(state, req)?;
    if !who.is_instructor() && !student_may_see_tally(state, &lecture_id, &question_id)? {
        return Err(Error::InstructorRequired.into());
    }
    let question = state
        .catalog
        .question(&lecture_id, &question_id)
        .ok_or_else(|| Error::UnknownQuestion {
            lecture_id: lecture_id.clone(),
            question_id: question_id.clone(),
        })?;
    let tally = results::tally(conn, &lecture_id, question)?;
    Ok(json!({
        "lecture": lecture_id,
        "questionId": question_id,
        "counts": tally.counts,
        "total": tally.total,
    }))
}

fn handle_list(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let conn = require_db(state)?;
    let question_id = get_required_str(&req.params, "questionId")?;
    let lecture_id = lecture_param(state, req)?;
    let limit = get_opt_usize(&req.params, "limit")?;
    let entries = results::list(conn, &lecture_id, &question_id, limit)?;
    Ok(json!({
        "lecture": lecture_id,
        "questionId": question_id,
        "responses": entries,
    }))
}

fn handle_export_csv(state: &AppState, req: &Request, who: &Identity) -> Result<serde_json::Value, HandlerErr> {
    require_instructor(who)?;
    let out_path = get_opt_str(&req.params, "outPath").map(PathBuf::from);
    if out_path.is_some() && !state.file_export {
        return Err(Error::bad_params("outPath is only accepted on the local transport; download the CSV instead").into());
    }
    let conn = require_db(state)?;
    let lecture_id = lecture_param(state, req)?;
    let export = results::export_lecture(conn, &lecture_id)?;
    let file_name = format!("responses_{}.csv", lecture_id);

    match out_path {
        Some(out_path) => {
            std::fs::write(&out_path, export.csv.as_bytes()).map_err(Error::from)?;
            info!(lecture = %lecture_id, rows = export.rows, path = %out_path.display(), "export written");
            Ok(json!({
                "lecture": lecture_id,
                "rowsExported": export.rows,
                "outPath": out_path.to_string_lossy(),
            }))
        }
        None => Ok(json!({
            "lecture": lecture_id,
            "rowsExported": export.rows,
            "fileName": file_name,
            "csv": export.csv,
        })),
    }
}

pub fn try_handle(state: &AppState, req: &Request, who: &Identity) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.tally" => handle_tally(state, req, who),
        "results.list" => handle_list(state, req, who),
        "export.lectureCsv" => handle_export_csv(state, req, who),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
