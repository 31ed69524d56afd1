//! Live question flow: the guarded response writer and the instructor
//! transitions that move a lecture between idle and a live question.
//!
//! Every call reads the lecture state fresh from the database; nothing is
//! cached between requests.

use crate::catalog::Catalog;
use crate::db::{self, ResponseRow};
use crate::error::{Error, Result};
use crate::session::normalize_student_id;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    AlreadySubmitted,
    StaleQuestion,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::AlreadySubmitted => "You already submitted a response for this question.",
            Rejection::StaleQuestion => "This question is no longer open.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted { submitted_at: String },
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
    /// Defaults to the current lecture.
    pub lecture_id: Option<&'a str>,
    pub question_id: &'a str,
    pub student_id: &'a str,
    pub answer: &'a str,
}

/// The lecture students currently see: the stored choice, else the first catalog lecture.
pub fn current_lecture(conn: &Connection, catalog: &Catalog) -> Result<Option<String>> {
    if let Some(stored) = db::current_lecture(conn)? {
        return Ok(Some(stored));
    }
    Ok(catalog.first_lecture().map(str::to_string))
}

fn target_lecture(conn: &Connection, catalog: &Catalog, explicit: Option<&str>) -> Result<String> {
    match explicit {
        Some(id) => {
            if catalog.lecture(id).is_none() {
                return Err(Error::UnknownLecture(id.to_string()));
            }
            Ok(id.to_string())
        }
        None => current_lecture(conn, catalog)?
            .ok_or_else(|| Error::bad_params("no lecture is selected")),
    }
}

pub fn submit(
    conn: &Connection,
    catalog: &Catalog,
    course: &str,
    req: SubmitRequest<'_>,
) -> Result<Submission> {
    let student_id = normalize_student_id(req.student_id)
        .ok_or_else(|| Error::bad_params("check in with a student id before submitting"))?;

    // Only the lecture students currently see can be answered. A named lecture
    // that the instructor has moved away from is stale even if its question is still live.
    let Some(lecture_id) = current_lecture(conn, catalog)? else {
        return Ok(Submission::Rejected(Rejection::StaleQuestion));
    };
    if req.lecture_id.is_some_and(|named| named != lecture_id) {
        debug!(lecture = ?req.lecture_id, current = %lecture_id, "submission for a lecture that is not current");
        return Ok(Submission::Rejected(Rejection::StaleQuestion));
    }

    let pointer = db::active_pointer(conn, &lecture_id)?;
    if pointer.question_id.as_deref() != Some(req.question_id) {
        debug!(
            lecture = %lecture_id,
            question = %req.question_id,
            active = ?pointer.question_id,
            "stale submission"
        );
        return Ok(Submission::Rejected(Rejection::StaleQuestion));
    }
    let Some(question) = catalog.question(&lecture_id, req.question_id) else {
        return Ok(Submission::Rejected(Rejection::StaleQuestion));
    };

    let answer = req.answer.trim();
    if answer.is_empty() {
        return Err(Error::bad_params("enter or select an answer before submitting"));
    }
    if question.is_multiple_choice() && !question.options.iter().any(|o| o == answer) {
        return Err(Error::bad_params(format!(
            "answer must be one of: {}",
            question.options.join(", ")
        )));
    }

    let row = ResponseRow {
        lecture_id: lecture_id.clone(),
        question_id: question.question_id.clone(),
        student_id: student_id.clone(),
        course: course.to_string(),
        question_type: question.kind.as_str().to_string(),
        question_prompt: question.prompt.clone(),
        answer: answer.to_string(),
        submitted_at: db::now_timestamp(),
    };
    if !db::insert_response_if_absent(conn, &row)? {
        return Ok(Submission::Rejected(Rejection::AlreadySubmitted));
    }

    info!(
        lecture = %lecture_id,
        question = %row.question_id,
        student = %student_id,
        "response accepted"
    );
    Ok(Submission::Accepted {
        submitted_at: row.submitted_at,
    })
}

/// Switching to a different lecture resets that lecture to idle with results hidden.
/// Returns whether the current lecture changed.
pub fn select_lecture(conn: &Connection, catalog: &Catalog, lecture_id: &str) -> Result<bool> {
    if catalog.lecture(lecture_id).is_none() {
        return Err(Error::UnknownLecture(lecture_id.to_string()));
    }
    if current_lecture(conn, catalog)?.as_deref() == Some(lecture_id) {
        return Ok(false);
    }
    let tx = conn.unchecked_transaction()?;
    db::set_current_lecture(&tx, lecture_id)?;
    db::reset_pointer(&tx, lecture_id)?;
    tx.commit()?;
    info!(lecture = %lecture_id, "current lecture selected");
    Ok(true)
}

/// Makes any question of the lecture live; order is not enforced.
pub fn advance(
    conn: &Connection,
    catalog: &Catalog,
    lecture_id: Option<&str>,
    question_id: &str,
) -> Result<String> {
    let lecture_id = target_lecture(conn, catalog, lecture_id)?;
    if catalog.question(&lecture_id, question_id).is_none() {
        return Err(Error::UnknownQuestion {
            lecture_id,
            question_id: question_id.to_string(),
        });
    }
    db::set_active_question(conn, &lecture_id, Some(question_id))?;
    info!(lecture = %lecture_id, question = %question_id, "question live");
    Ok(lecture_id)
}

pub fn clear_active(conn: &Connection, catalog: &Catalog, lecture_id: Option<&str>) -> Result<String> {
    let lecture_id = target_lecture(conn, catalog, lecture_id)?;
    db::set_active_question(conn, &lecture_id, None)?;
    info!(lecture = %lecture_id, "lecture idle");
    Ok(lecture_id)
}

/// Display flag only; responses are never touched.
pub fn set_results_visible(
    conn: &Connection,
    catalog: &Catalog,
    lecture_id: Option<&str>,
    visible: bool,
) -> Result<String> {
    let lecture_id = target_lecture(conn, catalog, lecture_id)?;
    db::set_results_visible(conn, &lecture_id, visible)?;
    info!(lecture = %lecture_id, visible, "results visibility changed");
    Ok(lecture_id)
}
