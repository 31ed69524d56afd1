use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FILE_PREFIX: &str = "questions_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "mcq", alias = "multiple_choice")]
    MultipleChoice,
    #[serde(rename = "text", alias = "free_text")]
    FreeText,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "mcq",
            QuestionKind::FreeText => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    pub fn is_multiple_choice(&self) -> bool {
        self.kind == QuestionKind::MultipleChoice
    }
}

#[derive(Debug, Deserialize)]
struct QuestionFile {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct Lecture {
    pub id: String,
    pub title: Option<String>,
    pub questions: Vec<Question>,
    /// Set when the lecture file could not be read or parsed.
    pub problem: Option<String>,
}

impl Lecture {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }
}

/// Static question definitions, keyed by lecture id. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    lectures: BTreeMap<String, Lecture>,
}

impl Catalog {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut catalog = Catalog::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "questions directory not found; no lectures loaded");
                return Ok(catalog);
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for ent in entries {
            let p = ent?.path();
            if p.is_file() && lecture_id_for(&p).is_some() {
                paths.push(p);
            }
        }
        paths.sort();

        for p in paths {
            let Some(id) = lecture_id_for(&p) else {
                continue;
            };
            let lecture = load_lecture(&id, &p);
            if let Some(problem) = &lecture.problem {
                warn!(lecture = %id, %problem, "lecture loaded without questions");
            }
            catalog.insert(lecture);
        }

        info!(
            dir = %dir.display(),
            lectures = catalog.lectures.len(),
            "question catalog loaded"
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, lecture: Lecture) {
        self.lectures.insert(lecture.id.clone(), lecture);
    }

    pub fn lecture(&self, id: &str) -> Option<&Lecture> {
        self.lectures.get(id)
    }

    pub fn question(&self, lecture_id: &str, question_id: &str) -> Option<&Question> {
        self.lecture(lecture_id).and_then(|l| l.question(question_id))
    }

    /// Lecture ids in sorted order.
    pub fn lecture_ids(&self) -> Vec<String> {
        self.lectures.keys().cloned().collect()
    }

    pub fn lectures(&self) -> impl Iterator<Item = &Lecture> {
        self.lectures.values()
    }

    pub fn first_lecture(&self) -> Option<&str> {
        self.lectures.keys().next().map(|s| s.as_str())
    }
}

/// `questions_lecture_01.json` -> `lecture_01`
fn lecture_id_for(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

fn load_lecture(id: &str, path: &Path) -> Lecture {
    let text = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => return broken_lecture(id, format!("cannot read {}: {}", path.display(), e)),
    };
    match parse_lecture(id, &text) {
        Ok(l) => l,
        Err(e) => broken_lecture(id, format!("bad JSON in {}: {}", path.display(), e)),
    }
}

pub fn parse_lecture(id: &str, text: &str) -> Result<Lecture, serde_json::Error> {
    let file: QuestionFile = serde_json::from_str(text)?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut questions = Vec::with_capacity(file.questions.len());
    for q in file.questions {
        if !seen.insert(q.question_id.clone()) {
            warn!(lecture = %id, question = %q.question_id, "duplicate question id dropped");
            continue;
        }
        questions.push(q);
    }
    Ok(Lecture {
        id: id.to_string(),
        title: file.title,
        questions,
        problem: None,
    })
}

fn broken_lecture(id: &str, problem: String) -> Lecture {
    Lecture {
        id: id.to_string(),
        title: None,
        questions: Vec::new(),
        problem: Some(problem),
    }
}
