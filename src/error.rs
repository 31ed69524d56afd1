use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures a single request can run into. None of them is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(#[from] rusqlite::Error),

    #[error("{0}")]
    BadParams(String),

    #[error("unknown lecture: {0}")]
    UnknownLecture(String),

    #[error("unknown question {question_id} in {lecture_id}")]
    UnknownQuestion {
        lecture_id: String,
        question_id: String,
    },

    #[error("instructor passcode required")]
    InstructorRequired,

    #[error("export failed: {0}")]
    Export(String),
}

impl Error {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Error::BadParams(message.into())
    }

    /// Stable code carried in the `error.code` field of a response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::DatabaseUnavailable(_) => "database_unavailable",
            Error::BadParams(_) => "bad_params",
            Error::UnknownLecture(_) => "unknown_lecture",
            Error::UnknownQuestion { .. } => "unknown_question",
            Error::InstructorRequired => "instructor_required",
            Error::Export(_) => "export_failed",
        }
    }

    /// Message shown to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            Error::DatabaseUnavailable(_) => {
                "The response store is temporarily unavailable. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Export(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Export(e.to_string())
    }
}
