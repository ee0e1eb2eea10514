use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{FULL_UNIT_TOPIC, GENERATED_TOPIC},
    error::AppError,
    models::{
        live_session::{LiveSession, SyllabusSelection},
        question::{AnswerKey, BankQuestion, GeneratedQuestion, PublicQuestion, QuestionId},
    },
    store::QuestionBank,
    utils::generator::QuestionGenerator,
};

/// Where a session's questions come from.
#[derive(Debug, Clone, Copy)]
pub enum QuestionPool<'a> {
    /// Filtered view over the persisted bank.
    Bank {
        unit: Option<&'a str>,
        topic: Option<&'a str>,
    },
    /// Questions embedded in the session, addressed by position.
    Generated {
        session_id: i64,
        items: &'a [GeneratedQuestion],
    },
}

impl<'a> QuestionPool<'a> {
    /// An empty or missing generated pool always means bank mode.
    pub fn of(session: &'a LiveSession) -> Self {
        match session.generated_pool.as_ref() {
            Some(pool) if !pool.items.is_empty() => QuestionPool::Generated {
                session_id: session.id,
                items: &pool.items,
            },
            _ => QuestionPool::Bank {
                unit: session.unit.as_deref(),
                topic: Some(session.topic.as_str()).filter(|t| *t != FULL_UNIT_TOPIC),
            },
        }
    }
}

fn public_from_bank(q: BankQuestion) -> PublicQuestion {
    PublicQuestion {
        id: QuestionId::Bank(q.id),
        topic: q.topic,
        question: q.question,
        options: q.options.0,
    }
}

/// Builds and reads question pools.
///
/// Holds the generation client and the timeout applied to every call so the
/// configuration is injected once, at construction.
pub struct PoolResolver {
    generator: Arc<dyn QuestionGenerator>,
    timeout: Duration,
}

impl PoolResolver {
    pub fn new(generator: Arc<dyn QuestionGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Asks the generator for every selection and concatenates the results.
    ///
    /// Never fails: a timeout, error or malformed draft just contributes
    /// nothing, which may leave the pool empty.
    pub async fn generate_pool(&self, selections: &[SyllabusSelection]) -> Vec<GeneratedQuestion> {
        let mut pool = Vec::new();

        for selection in selections {
            let drafts = match tokio::time::timeout(
                self.timeout,
                self.generator.generate(&selection.point, selection.count),
            )
            .await
            {
                Ok(Ok(drafts)) => drafts,
                Ok(Err(e)) => {
                    tracing::warn!(point = %selection.point, error = %e, "Question generation failed");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(
                        point = %selection.point,
                        timeout_secs = self.timeout.as_secs(),
                        "Question generation timed out"
                    );
                    continue;
                }
            };

            let received = drafts.len();
            let accepted: Vec<_> = drafts
                .into_iter()
                .filter(GeneratedQuestion::is_well_formed)
                .take(selection.count as usize)
                .collect();

            if accepted.len() < received {
                tracing::warn!(
                    point = %selection.point,
                    dropped = received - accepted.len(),
                    "Discarded malformed or surplus generated questions"
                );
            }
            pool.extend(accepted);
        }

        pool
    }

    /// The question delivery view: no correct option, no explanation.
    pub async fn deliver(
        &self,
        session: &LiveSession,
        bank: &dyn QuestionBank,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        match QuestionPool::of(session) {
            QuestionPool::Generated { session_id, items } => Ok(items
                .iter()
                .enumerate()
                .map(|(i, q)| PublicQuestion {
                    id: QuestionId::generated(session_id, i),
                    topic: GENERATED_TOPIC.to_string(),
                    question: q.question.clone(),
                    options: q.options.clone(),
                })
                .collect()),
            QuestionPool::Bank { unit, topic } => {
                let questions = bank.query_questions(unit, topic).await?;
                Ok(questions.into_iter().map(public_from_bank).collect())
            }
        }
    }

    /// Answer keys for the referenced ids that exist in this session's pool.
    pub async fn answer_keys(
        &self,
        session: &LiveSession,
        bank: &dyn QuestionBank,
        ids: &[QuestionId],
    ) -> Result<HashMap<QuestionId, AnswerKey>, AppError> {
        match QuestionPool::of(session) {
            QuestionPool::Generated { session_id, items } => Ok(items
                .iter()
                .enumerate()
                .map(|(i, q)| (QuestionId::generated(session_id, i), AnswerKey::from(q)))
                .filter(|(id, _)| ids.contains(id))
                .collect()),
            QuestionPool::Bank { .. } => {
                let mut bank_ids: Vec<i64> = ids
                    .iter()
                    .filter_map(|id| match id {
                        QuestionId::Bank(n) => Some(*n),
                        QuestionId::Generated(_) => None,
                    })
                    .collect();
                bank_ids.sort_unstable();
                bank_ids.dedup();

                let questions = bank.fetch_questions_by_ids(&bank_ids).await?;
                Ok(questions
                    .into_iter()
                    .map(|q| (QuestionId::Bank(q.id), AnswerKey::from(q)))
                    .collect())
            }
        }
    }
}
