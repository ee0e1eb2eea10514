// src/models/question.rs

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// Schema version written alongside every persisted generated pool.
pub const GENERATED_POOL_VERSION: u32 = 1;

/// Identity of a question inside a session.
///
/// Bank questions keep their stable database id. Generated questions only
/// exist inside one session and are addressed as `"{session_id}:{index}"`.
/// On the wire this is a bare number or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionId {
    Bank(i64),
    Generated(String),
}

impl QuestionId {
    pub fn generated(session_id: i64, index: usize) -> Self {
        QuestionId::Generated(format!("{}:{}", session_id, index))
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Bank(id) => write!(f, "{}", id),
            QuestionId::Generated(id) => f.write_str(id),
        }
    }
}

/// One selectable option, e.g. `{"id": "b", "text": "Just-in-time"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// Represents the 'mcqs' table (the persisted question bank).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankQuestion {
    pub id: i64,
    pub unit: Option<String>,
    pub topic: String,
    pub question: String,
    pub options: Json<Vec<QuestionOption>>,
    pub correct_option_id: String,
    pub explanation: String,
}

/// A question produced by the generation service and embedded in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: String,
    #[serde(default)]
    pub explanation: String,
}

impl GeneratedQuestion {
    /// Checks the invariants every pool entry must hold: non-empty text, at
    /// least two options with unique ids, and a correct id naming one of them.
    pub fn is_well_formed(&self) -> bool {
        if self.question.trim().is_empty() || self.options.len() < 2 {
            return false;
        }

        let mut seen = HashSet::new();
        for opt in &self.options {
            if opt.id.trim().is_empty() || !seen.insert(opt.id.as_str()) {
                return false;
            }
        }

        seen.contains(self.correct_option_id.as_str())
    }
}

/// Versioned envelope for the generated questions stored on a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPool {
    pub version: u32,
    pub items: Vec<GeneratedQuestion>,
}

impl GeneratedPool {
    pub fn new(items: Vec<GeneratedQuestion>) -> Self {
        Self {
            version: GENERATED_POOL_VERSION,
            items,
        }
    }
}

/// DTO for sending a question to a participant during an active session.
/// Never carries the correct option or the explanation.
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub topic: String,
    pub question: String,
    pub options: Vec<QuestionOption>,
}

/// Grading data for one question, used by scoring and the review view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey {
    pub correct_option_id: String,
    pub explanation: String,
}

impl From<&GeneratedQuestion> for AnswerKey {
    fn from(q: &GeneratedQuestion) -> Self {
        Self {
            correct_option_id: q.correct_option_id.clone(),
            explanation: q.explanation.clone(),
        }
    }
}

impl From<BankQuestion> for AnswerKey {
    fn from(q: BankQuestion) -> Self {
        Self {
            correct_option_id: q.correct_option_id,
            explanation: q.explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(id: &str) -> QuestionOption {
        QuestionOption {
            id: id.to_string(),
            text: format!("Option {}", id),
        }
    }

    fn draft(options: Vec<QuestionOption>, correct: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "What is logistics?".to_string(),
            options,
            correct_option_id: correct.to_string(),
            explanation: "Because.".to_string(),
        }
    }

    #[test]
    fn test_well_formed_question() {
        assert!(draft(vec![opt("a"), opt("b"), opt("c"), opt("d")], "b").is_well_formed());
    }

    #[test]
    fn test_rejects_unknown_correct_option() {
        assert!(!draft(vec![opt("a"), opt("b")], "e").is_well_formed());
    }

    #[test]
    fn test_rejects_duplicate_option_ids() {
        assert!(!draft(vec![opt("a"), opt("a"), opt("b")], "a").is_well_formed());
    }

    #[test]
    fn test_rejects_single_option() {
        assert!(!draft(vec![opt("a")], "a").is_well_formed());
    }

    #[test]
    fn test_question_id_wire_format() {
        let bank: QuestionId = serde_json::from_str("42").unwrap();
        assert_eq!(bank, QuestionId::Bank(42));

        let generated: QuestionId = serde_json::from_str("\"7:3\"").unwrap();
        assert_eq!(generated, QuestionId::generated(7, 3));
        assert_eq!(generated.to_string(), "7:3");
    }
}
