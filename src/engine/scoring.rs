use std::collections::{HashMap, HashSet};

use crate::models::{
    participant::{AnswerDetail, AnswerSubmission},
    question::{AnswerKey, QuestionId},
};

/// Result of grading one submission.
#[derive(Debug, PartialEq, Eq)]
pub struct Graded {
    pub score: i32,
    pub details: Vec<AnswerDetail>,
}

/// Grades answers against the session's answer keys.
///
/// Answers naming an unknown question are skipped, as are repeated answers
/// for a question that was already evaluated in this submission.
pub fn grade(answers: &[AnswerSubmission], keys: &HashMap<QuestionId, AnswerKey>) -> Graded {
    let mut seen = HashSet::new();
    let mut score = 0;
    let mut details = Vec::new();

    for answer in answers {
        let Some(key) = keys.get(&answer.question_id) else {
            continue;
        };
        if !seen.insert(&answer.question_id) {
            continue;
        }

        let is_correct = answer.selected_option_id == key.correct_option_id;
        if is_correct {
            score += 1;
        }
        details.push(AnswerDetail {
            question_id: answer.question_id.clone(),
            selected: answer.selected_option_id.clone(),
            is_correct,
        });
    }

    Graded { score, details }
}
