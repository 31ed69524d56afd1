use crate::catalog::Question;
use crate::db::{self, ResponseRow};
use crate::error::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

pub const EXPORT_HEADER: [&str; 8] = [
    "timestamp",
    "course",
    "lecture",
    "student_id",
    "question_id",
    "question_type",
    "question_prompt",
    "response",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCount {
    pub option: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub counts: Vec<OptionCount>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub student_id: String,
    pub answer: String,
    pub submitted_at: String,
}

/// Counts per option, in the question's option order. Answers outside the option set are ignored.
pub fn tally(conn: &Connection, lecture_id: &str, question: &Question) -> Result<Tally> {
    if !question.is_multiple_choice() {
        return Err(Error::bad_params(format!(
            "{} is not a multiple-choice question",
            question.question_id
        )));
    }
    let rows = db::responses_for_question(conn, lecture_id, &question.question_id)?;
    let mut by_answer: HashMap<&str, i64> = HashMap::new();
    for r in &rows {
        *by_answer.entry(r.answer.as_str()).or_insert(0) += 1;
    }
    let counts: Vec<OptionCount> = question
        .options
        .iter()
        .map(|o| OptionCount {
            option: o.clone(),
            count: by_answer.get(o.as_str()).copied().unwrap_or(0),
        })
        .collect();
    let total = counts.iter().map(|c| c.count).sum();
    Ok(Tally { counts, total })
}

/// Oldest first. With a limit, only the latest `limit` answers are kept.
pub fn list(
    conn: &Connection,
    lecture_id: &str,
    question_id: &str,
    limit: Option<usize>,
) -> Result<Vec<AnswerEntry>> {
    let rows = db::responses_for_question(conn, lecture_id, question_id)?;
    let skip = match limit {
        Some(n) => rows.len().saturating_sub(n),
        None => 0,
    };
    Ok(rows
        .into_iter()
        .skip(skip)
        .map(|r| AnswerEntry {
            student_id: r.student_id,
            answer: r.answer,
            submitted_at: r.submitted_at,
        })
        .collect())
}

pub struct Export {
    pub csv: String,
    pub rows: usize,
}

/// One CSV row per stored response of the lecture, in submission order.
pub fn export_lecture(conn: &Connection, lecture_id: &str) -> Result<Export> {
    let rows = db::responses_for_lecture(conn, lecture_id)?;
    let csv = render_csv(&rows)?;
    Ok(Export {
        csv,
        rows: rows.len(),
    })
}

fn render_csv(rows: &[ResponseRow]) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(EXPORT_HEADER)?;
    for r in rows {
        w.write_record([
            r.submitted_at.as_str(),
            r.course.as_str(),
            r.lecture_id.as_str(),
            r.student_id.as_str(),
            r.question_id.as_str(),
            r.question_type.as_str(),
            r.question_prompt.as_str(),
            r.answer.as_str(),
        ])?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| Error::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Export(e.to_string()))
}
