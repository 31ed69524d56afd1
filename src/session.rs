use serde::{Deserialize, Serialize};

/// What the caller claims about itself. Nothing here is authenticated
/// beyond the instructor passcode comparison.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    /// Normalized student id, `None` until the student has checked in.
    pub student_id: Option<String>,
    /// Instructor mode was requested but the passcode did not match.
    pub instructor_locked: bool,
}

impl Identity {
    pub fn is_instructor(&self) -> bool {
        self.role == Role::Instructor
    }
}

pub fn requested_mode(info: &SessionInfo) -> String {
    info.mode
        .as_deref()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "student".to_string())
}

/// Trimmed and lowercased; empty ids are treated as absent.
pub fn normalize_student_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// A wrong or missing passcode downgrades silently to student mode.
pub fn resolve(info: &SessionInfo, instructor_key: Option<&str>) -> Identity {
    let wants_instructor = requested_mode(info) == "instructor";
    let authorized = wants_instructor
        && match (instructor_key, info.key.as_deref()) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        };

    Identity {
        role: if authorized {
            Role::Instructor
        } else {
            Role::Student
        },
        student_id: info.student_id.as_deref().and_then(normalize_student_id),
        instructor_locked: wants_instructor && !authorized,
    }
}
