//! TOML question bank parser.
//!
//! Loads static question banks from TOML files and directories, validates
//! them, and writes them back out (used by `neuroscreen generate`).

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{option_letter, Condition, Difficulty, Question, QuestionKind};

/// A named collection of authored questions.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(id: &str, name: &str, questions: Vec<Question>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            questions,
        }
    }

    /// Merge several banks into one, keeping the first bank's header.
    pub fn merge(mut banks: Vec<QuestionBank>) -> Option<QuestionBank> {
        if banks.is_empty() {
            return None;
        }
        let mut first = banks.remove(0);
        for bank in banks {
            first.questions.extend(bank.questions);
        }
        Some(first)
    }

    /// Render the bank as TOML in the same shape `parse_bank_str` reads.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = TomlBankFile {
            bank: TomlBankHeader {
                id: self.id.clone(),
                name: self.name.clone(),
                description: self.description.clone(),
            },
            questions: self.questions.iter().map(TomlQuestion::from).collect(),
        };
        toml::to_string_pretty(&file).context("failed to serialize question bank")
    }

    /// Write the bank to `path` as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write question bank to {}", path.display()))
    }
}

/// An answer key as written by a person or returned by an LLM: an index, a
/// boolean, or text (an option letter, an index, or the option itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AnswerKey {
    Index(i64),
    Bool(bool),
    Text(String),
}

impl AnswerKey {
    /// Resolve to a zero-based option index. No range check is applied to
    /// explicit indices or letters; `QuestionKind::problems` reports those.
    pub(crate) fn option_index(&self, options: &[String]) -> Result<usize, String> {
        match self {
            AnswerKey::Index(i) => usize::try_from(*i).map_err(|_| format!("negative index {i}")),
            AnswerKey::Bool(b) => Err(format!("boolean {b} is not a valid option")),
            AnswerKey::Text(text) => {
                let text = text.trim();
                if let Some(i) = options
                    .iter()
                    .position(|o| o.trim().eq_ignore_ascii_case(text))
                {
                    return Ok(i);
                }
                if let Ok(i) = text.parse::<usize>() {
                    return Ok(i);
                }
                // "B", "B)", "B.", "B) option text"
                let mut chars = text.chars();
                if let Some(first) = chars.next().filter(|c| c.is_ascii_alphabetic()) {
                    let rest = chars.as_str();
                    if rest.is_empty() || rest.starts_with([')', '.', ':', ' ']) {
                        return Ok((first.to_ascii_uppercase() as u8 - b'A') as usize);
                    }
                }
                Err(format!("'{text}' does not match any option"))
            }
        }
    }

    pub(crate) fn as_bool(&self) -> Result<bool, String> {
        match self {
            AnswerKey::Bool(b) => Ok(*b),
            AnswerKey::Text(t) => match t.trim().to_lowercase().as_str() {
                "true" | "yes" | "a" => Ok(true),
                "false" | "no" | "b" => Ok(false),
                other => Err(format!("'{other}' is not true or false")),
            },
            AnswerKey::Index(i) => Err(format!("index {i} is not true or false")),
        }
    }
}

/// Intermediate TOML structure for question bank files.
#[derive(Debug, Serialize, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TomlQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    text: String,
    condition: String,
    difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    explanation: String,
    #[serde(default = "default_question_type")]
    question_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correct_answer: Option<AnswerKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    correct_order: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt_audio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    accepted_transcripts: Vec<String>,
}

fn default_question_type() -> String {
    "multiple_choice".to_string()
}

impl From<&Question> for TomlQuestion {
    fn from(q: &Question) -> Self {
        let mut t = TomlQuestion {
            id: Some(q.id),
            text: q.text.clone(),
            condition: q.condition.to_string(),
            difficulty: q.difficulty.to_string(),
            category: q.category.clone(),
            explanation: q.explanation.clone(),
            question_type: String::new(),
            options: vec![],
            correct_answer: None,
            items: vec![],
            correct_order: vec![],
            prompt_audio: None,
            accepted_transcripts: vec![],
        };
        match &q.kind {
            QuestionKind::MultipleChoice {
                options,
                correct_answer,
            } => {
                t.question_type = "multiple_choice".into();
                t.options = options.clone();
                t.correct_answer = Some(AnswerKey::Text(option_letter(*correct_answer).to_string()));
            }
            QuestionKind::TrueFalse { correct_answer } => {
                t.question_type = "true_false".into();
                t.correct_answer = Some(AnswerKey::Bool(*correct_answer));
            }
            QuestionKind::Sequencing {
                items,
                correct_order,
            } => {
                t.question_type = "sequencing".into();
                t.items = items.clone();
                t.correct_order = correct_order.clone();
            }
            QuestionKind::AudioResponse {
                prompt_audio,
                accepted_transcripts,
            } => {
                t.question_type = "audio_response".into();
                t.prompt_audio = Some(prompt_audio.clone());
                t.accepted_transcripts = accepted_transcripts.clone();
            }
        }
        t
    }
}

impl TomlQuestion {
    fn into_question(self, index: usize) -> Result<Question> {
        let label = || format!("question #{}", index + 1);
        let condition: Condition = self
            .condition
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}: {e}", label()))?;
        let difficulty: Difficulty = self
            .difficulty
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}: {e}", label()))?;

        let kind = match self.question_type.as_str() {
            "multiple_choice" => {
                let key = self
                    .correct_answer
                    .ok_or_else(|| anyhow::anyhow!("{}: missing correct_answer", label()))?;
                let correct_answer = key
                    .option_index(&self.options)
                    .map_err(|e| anyhow::anyhow!("{}: {e}", label()))?;
                QuestionKind::MultipleChoice {
                    options: self.options,
                    correct_answer,
                }
            }
            "true_false" => {
                let key = self
                    .correct_answer
                    .ok_or_else(|| anyhow::anyhow!("{}: missing correct_answer", label()))?;
                QuestionKind::TrueFalse {
                    correct_answer: key.as_bool().map_err(|e| anyhow::anyhow!("{}: {e}", label()))?,
                }
            }
            "sequencing" => QuestionKind::Sequencing {
                items: self.items,
                correct_order: self.correct_order,
            },
            "audio_response" => QuestionKind::AudioResponse {
                prompt_audio: self
                    .prompt_audio
                    .ok_or_else(|| anyhow::anyhow!("{}: missing prompt_audio", label()))?,
                accepted_transcripts: self.accepted_transcripts,
            },
            other => anyhow::bail!("{}: unknown question_type '{other}'", label()),
        };

        Ok(Question {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            text: self.text,
            condition,
            difficulty,
            category: self.category,
            explanation: self.explanation,
            kind,
            created_at: Utc::now(),
        })
    }
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| q.into_question(i))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid question in {}", source_path.display()))?;

    Ok(QuestionBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        description: parsed.bank.description,
        questions,
    })
}

/// Recursively load all `.toml` question banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a bank from a file, or merge every bank found under a directory.
pub fn load_bank(path: &Path) -> Result<QuestionBank> {
    if path.is_dir() {
        let banks = load_bank_directory(path)?;
        QuestionBank::merge(banks)
            .ok_or_else(|| anyhow::anyhow!("no question banks found in {}", path.display()))
    } else {
        parse_bank(path)
    }
}

/// A warning from question bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<Uuid>,
    /// Warning message.
    pub message: String,
}

/// Validate a bank for common issues.
pub fn validate_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for q in &bank.questions {
        if !seen_ids.insert(q.id) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: format!("duplicate question ID: {}", q.id),
            });
        }
    }

    for q in &bank.questions {
        if q.text.trim().is_empty() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: "question text is empty".into(),
            });
        }
        for problem in q.kind.problems() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: problem,
            });
        }
    }

    if bank.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "bank contains no questions".into(),
        });
    }

    warnings
}
