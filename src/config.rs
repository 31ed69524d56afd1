use clap::Parser;
use std::path::PathBuf;

/// Classroom participation service: live questions, student answers, CSV export.
#[derive(Parser, Debug, Clone)]
#[command(name = "participationd", version, about, long_about = None)]
pub struct Config {
    /// Port for the HTTP listener
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Shared passcode that unlocks instructor mode. Instructor mode is disabled when unset.
    #[arg(long, env = "INSTRUCTOR_KEY", hide_env_values = true)]
    pub instructor_key: Option<String>,

    /// Directory holding questions_<lecture>.json files
    #[arg(long, env = "QUESTIONS_DIR", default_value = "questions")]
    pub questions_dir: PathBuf,

    /// Directory for the response database
    #[arg(long, env = "PARTICIPATION_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Course name stamped on every response
    #[arg(long, env = "COURSE", default_value = "Course")]
    pub course: String,

    /// Serve JSON lines on stdin/stdout instead of HTTP
    #[arg(long)]
    pub stdio: bool,
}

impl Config {
    pub fn instructor_key(&self) -> Option<&str> {
        self.instructor_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests(data_dir: PathBuf) -> Self {
        Config {
            port: 0,
            instructor_key: Some("letmein".to_string()),
            questions_dir: PathBuf::from("questions"),
            data_dir,
            course: "Course".to_string(),
            stdio: false,
        }
    }
}
