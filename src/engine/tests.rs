use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use tokio::task::JoinSet;

use super::{LiveEngine, pool::PoolResolver};
use crate::{
    error::AppError,
    models::{
        live_session::{
            CreateGeneratedSessionRequest, CreateSessionRequest, SessionStatus, SyllabusSelection,
        },
        participant::{AnswerSubmission, SubmitAnswersRequest},
        question::{BankQuestion, GeneratedQuestion, QuestionId, QuestionOption},
        user::UserIdentity,
    },
    store::{MemoryStore, SessionStore},
    utils::generator::{GenerationError, QuestionGenerator},
};

const HOST: i64 = 1;

struct FixedGenerator(Vec<GeneratedQuestion>);

#[async_trait]
impl QuestionGenerator for FixedGenerator {
    async fn generate(&self, _point: &str, count: u32) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        Ok(self.0.iter().take(count as usize).cloned().collect())
    }
}

struct FailingGenerator;

#[async_trait]
impl QuestionGenerator for FailingGenerator {
    async fn generate(&self, _point: &str, _count: u32) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        Err(GenerationError::Http("service unavailable".to_string()))
    }
}

struct StalledGenerator;

#[async_trait]
impl QuestionGenerator for StalledGenerator {
    async fn generate(&self, _point: &str, _count: u32) -> Result<Vec<GeneratedQuestion>, GenerationError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

fn options() -> Vec<QuestionOption> {
    ["a", "b", "c", "d"]
        .iter()
        .map(|id| QuestionOption {
            id: id.to_string(),
            text: format!("Choice {}", id),
        })
        .collect()
}

fn generated(n: usize, correct: &str) -> GeneratedQuestion {
    GeneratedQuestion {
        question: format!("Generated question {}", n),
        options: options(),
        correct_option_id: correct.to_string(),
        explanation: format!("Explanation {}", n),
    }
}

fn bank_question(unit: &str, topic: &str, correct: &str) -> BankQuestion {
    BankQuestion {
        id: 0,
        unit: Some(unit.to_string()),
        topic: topic.to_string(),
        question: format!("{} question", topic),
        options: Json(options()),
        correct_option_id: correct.to_string(),
        explanation: "Bank explanation".to_string(),
    }
}

fn engine_with(store: Arc<MemoryStore>, generator: Arc<dyn QuestionGenerator>) -> LiveEngine {
    LiveEngine::new(
        store.clone(),
        store.clone(),
        store,
        PoolResolver::new(generator, Duration::from_millis(100)),
    )
}

fn bank_engine(store: Arc<MemoryStore>) -> LiveEngine {
    engine_with(store, Arc::new(FixedGenerator(Vec::new())))
}

fn bank_request(topic: &str, unit: Option<&str>) -> CreateSessionRequest {
    CreateSessionRequest {
        topic: topic.to_string(),
        unit: unit.map(str::to_string),
        duration_minutes: 10,
    }
}

fn generated_request(counts: &[u32]) -> CreateGeneratedSessionRequest {
    CreateGeneratedSessionRequest {
        duration_minutes: 15,
        syllabus_selections: counts
            .iter()
            .enumerate()
            .map(|(i, &count)| SyllabusSelection {
                point: format!("Point {}", i),
                count,
            })
            .collect(),
    }
}

fn submit_request(answers: Vec<(QuestionId, &str)>, time: i32) -> SubmitAnswersRequest {
    SubmitAnswersRequest {
        answers: answers
            .into_iter()
            .map(|(question_id, selected)| AnswerSubmission {
                question_id,
                selected_option_id: selected.to_string(),
            })
            .collect(),
        time_taken_seconds: time,
    }
}

async fn seeded_store() -> (Arc<MemoryStore>, Vec<i64>) {
    let store = Arc::new(MemoryStore::new());
    let ids = vec![
        store.add_question(bank_question("5", "5.5", "b")).await,
        store.add_question(bank_question("5", "5.5", "c")).await,
        store.add_question(bank_question("5", "5.6", "a")).await,
        store.add_question(bank_question("6", "6.1", "d")).await,
    ];
    for id in 1..=10 {
        store
            .add_user(UserIdentity {
                id,
                username: format!("student{}", id),
                full_name: None,
            })
            .await;
    }
    (store, ids)
}

#[tokio::test]
async fn test_lifecycle_is_monotonic() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);

    let session = engine.create_session(HOST, &bank_request("5.5", Some("5"))).await.unwrap();
    assert_eq!(session.status, SessionStatus::Waiting);
    assert!(session.started_at.is_none());
    assert_eq!(session.exam_id.len(), 6);

    let started = engine.start(session.id, HOST).await.unwrap();
    let status = engine.status(session.id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Active);
    assert_eq!(status.started_at, Some(started.started_at));

    let again = engine.start(session.id, HOST).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    assert!(engine.end(session.id, HOST).await.unwrap().ended_now);
    assert!(!engine.end(session.id, HOST).await.unwrap().ended_now);

    let after = engine.start(session.id, HOST).await;
    assert!(matches!(after, Err(AppError::InvalidState(_))));
    assert_eq!(engine.status(session.id).await.unwrap().status, SessionStatus::Finished);
}

#[tokio::test]
async fn test_non_host_is_rejected_in_every_state() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap();

    assert!(matches!(engine.start(session.id, 2).await, Err(AppError::Forbidden(_))));
    assert!(matches!(engine.end(session.id, 2).await, Err(AppError::Forbidden(_))));

    engine.start(session.id, HOST).await.unwrap();
    assert!(matches!(engine.start(session.id, 2).await, Err(AppError::Forbidden(_))));
    assert!(matches!(engine.end(session.id, 2).await, Err(AppError::Forbidden(_))));

    engine.end(session.id, HOST).await.unwrap();
    assert!(matches!(engine.end(session.id, 2).await, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_ending_waiting_session_stamps_start_time() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap();

    engine.end(session.id, HOST).await.unwrap();
    let status = engine.status(session.id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Finished);
    assert!(status.started_at.is_some());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);

    assert!(matches!(engine.status(404).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.join(404, 2).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.leaderboard(404).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.find_by_code("ZZZZZZ").await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_join_is_idempotent_and_closes_at_finish() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap();

    let first = engine.join_by_code(&session.exam_id.to_lowercase(), 2).await.unwrap();
    let second = engine.join(session.id, 2).await.unwrap();
    assert!(!first.already_joined);
    assert!(second.already_joined);
    assert_eq!(engine.status(session.id).await.unwrap().participants_count, 1);

    engine.start(session.id, HOST).await.unwrap();
    let late = engine.join(session.id, 3).await.unwrap();
    assert_eq!(late.status, SessionStatus::Active);

    engine.end(session.id, HOST).await.unwrap();
    assert!(matches!(engine.join(session.id, 4).await, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_questions_only_while_active() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", Some("5"))).await.unwrap();

    assert!(matches!(engine.questions(session.id).await, Err(AppError::InvalidState(_))));

    engine.start(session.id, HOST).await.unwrap();
    let questions = engine.questions(session.id).await.unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.topic == "5.5"));

    engine.end(session.id, HOST).await.unwrap();
    assert!(matches!(engine.questions(session.id).await, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_bank_filters_combine() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);

    let cases = [
        (bank_request("Full Unit", Some("5")), 3),
        (bank_request("6.1", None), 1),
        (bank_request("Full Unit", None), 4),
        (bank_request("5.6", Some("6")), 0),
    ];

    for (req, expected) in cases {
        let session = engine.create_session(HOST, &req).await.unwrap();
        engine.start(session.id, HOST).await.unwrap();
        let questions = engine.questions(session.id).await.unwrap();
        assert_eq!(questions.len(), expected, "topic {:?} unit {:?}", req.topic, req.unit);
    }
}

#[tokio::test]
async fn test_submit_grades_once() {
    let (store, ids) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", Some("5"))).await.unwrap();
    engine.join(session.id, 2).await.unwrap();

    let req = submit_request(
        vec![
            (QuestionId::Bank(ids[0]), "b"),
            (QuestionId::Bank(ids[1]), "a"),
            (QuestionId::Bank(9999), "a"),
        ],
        75,
    );

    assert!(matches!(
        engine.submit(session.id, 2, &req).await,
        Err(AppError::InvalidState(_))
    ));

    engine.start(session.id, HOST).await.unwrap();
    let outcome = engine.submit(session.id, 2, &req).await.unwrap();
    assert_eq!(outcome.score, 1);
    assert_eq!(outcome.total, 2);

    let better = submit_request(vec![(QuestionId::Bank(ids[1]), "c")], 10);
    assert!(matches!(
        engine.submit(session.id, 2, &better).await,
        Err(AppError::Conflict(_))
    ));

    let review = engine.review(session.id, 2).await.unwrap();
    assert_eq!(review.score, 1);
    assert_eq!(review.time_taken_seconds, 75);
    assert_eq!(review.answers.len(), 2);
    assert_eq!(review.answers[1].correct_option_id.as_deref(), Some("c"));
    assert_eq!(review.answers[1].explanation.as_deref(), Some("Bank explanation"));
}

#[tokio::test]
async fn test_submit_requires_membership() {
    let (store, ids) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap();
    engine.start(session.id, HOST).await.unwrap();

    let req = submit_request(vec![(QuestionId::Bank(ids[0]), "b")], 5);
    assert!(matches!(
        engine.submit(session.id, 7, &req).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(engine.review(session.id, 7).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_review_before_submit_is_invalid_state() {
    let (store, _) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap();
    engine.join(session.id, 2).await.unwrap();

    assert!(matches!(engine.review(session.id, 2).await, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_generated_pool_is_used_and_withheld() {
    let (store, _) = seeded_store().await;
    let generator = FixedGenerator(vec![generated(0, "a"), generated(1, "b"), generated(2, "c")]);
    let engine = engine_with(store, Arc::new(generator));

    let session = engine
        .create_generated_session(HOST, &generated_request(&[2, 1]))
        .await
        .unwrap();
    assert!(session.has_generated_questions());
    assert_eq!(session.generated_question_count(), 3);
    assert_eq!(session.topic, "Point 0, Point 1");

    engine.join(session.id, 2).await.unwrap();
    engine.start(session.id, HOST).await.unwrap();

    let questions = engine.questions(session.id).await.unwrap();
    let ids: Vec<QuestionId> = questions.iter().map(|q| q.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            QuestionId::generated(session.id, 0),
            QuestionId::generated(session.id, 1),
            QuestionId::generated(session.id, 2),
        ]
    );
    assert!(questions.iter().all(|q| q.topic == "AI"));

    let wire = serde_json::to_value(&questions).unwrap();
    for item in wire.as_array().unwrap() {
        let keys: HashSet<&str> = item.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, HashSet::from(["id", "topic", "question", "options"]));
    }
    let text = wire.to_string();
    assert!(!text.contains("correct_option_id"));
    assert!(!text.contains("explanation"));

    // second selection restarts the generator list, so index 2 is draft 0 again
    let req = submit_request(
        vec![
            (QuestionId::generated(session.id, 0), "a"),
            (QuestionId::generated(session.id, 1), "a"),
            (QuestionId::generated(session.id, 2), "a"),
            (QuestionId::Bank(1), "b"),
        ],
        40,
    );
    let outcome = engine.submit(session.id, 2, &req).await.unwrap();
    assert_eq!(outcome.score, 2);
    assert_eq!(outcome.total, 3);
}

#[tokio::test]
async fn test_malformed_drafts_are_dropped() {
    let (store, _) = seeded_store().await;
    let mut broken = generated(1, "z");
    broken.question = "Broken".to_string();
    let generator = FixedGenerator(vec![generated(0, "a"), broken, generated(2, "d")]);
    let engine = engine_with(store, Arc::new(generator));

    let session = engine
        .create_generated_session(HOST, &generated_request(&[3]))
        .await
        .unwrap();
    assert_eq!(session.generated_question_count(), 2);
}

#[tokio::test]
async fn test_generation_failure_falls_back_to_bank() {
    for generator in [
        Arc::new(FailingGenerator) as Arc<dyn QuestionGenerator>,
        Arc::new(StalledGenerator) as Arc<dyn QuestionGenerator>,
    ] {
        let (store, _) = seeded_store().await;
        let engine = engine_with(store, generator);

        let session = engine
            .create_generated_session(HOST, &generated_request(&[5]))
            .await
            .unwrap();
        assert!(!session.has_generated_questions());
        assert_eq!(session.status, SessionStatus::Waiting);

        engine.start(session.id, HOST).await.unwrap();
        let questions = engine.questions(session.id).await.unwrap();
        assert!(questions.iter().all(|q| matches!(q.id, QuestionId::Bank(_))));
    }
}

#[tokio::test]
async fn test_leaderboard_orders_by_score_then_time() {
    let (store, ids) = seeded_store().await;
    let engine = bank_engine(store);
    let session = engine.create_session(HOST, &bank_request("Full Unit", None)).await.unwrap();
    for user in 2..=5 {
        engine.join(session.id, user).await.unwrap();
    }
    engine.start(session.id, HOST).await.unwrap();

    let all_right = |time| {
        submit_request(
            vec![
                (QuestionId::Bank(ids[0]), "b"),
                (QuestionId::Bank(ids[1]), "c"),
                (QuestionId::Bank(ids[2]), "a"),
            ],
            time,
        )
    };
    engine.submit(session.id, 2, &submit_request(vec![(QuestionId::Bank(ids[0]), "b")], 20)).await.unwrap();
    engine.submit(session.id, 3, &all_right(120)).await.unwrap();
    engine.submit(session.id, 4, &all_right(90)).await.unwrap();

    let board = engine.leaderboard(session.id).await.unwrap();
    let order: Vec<(usize, i64, i32)> = board
        .leaderboard
        .iter()
        .map(|e| (e.rank, e.user_id, e.score))
        .collect();
    assert_eq!(order, vec![(1, 4, 3), (2, 3, 3), (3, 2, 1)]);
    assert_eq!(board.session.exam_id, session.exam_id);
    assert_eq!(board.session.status, SessionStatus::Active);
    assert_eq!(board.leaderboard[0].full_name, "student4");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_codes() {
    let (store, _) = seeded_store().await;
    let engine = Arc::new(bank_engine(store.clone()));

    let mut set = JoinSet::new();
    for _ in 0..64 {
        let engine = engine.clone();
        set.spawn(async move { engine.create_session(HOST, &bank_request("5.5", None)).await });
    }

    let mut codes = HashSet::new();
    while let Some(result) = set.join_next().await {
        let session = result.unwrap().unwrap();
        assert!(codes.insert(session.exam_id.clone()));
        assert_eq!(
            store.find_session_by_code(&session.exam_id).await.unwrap().unwrap().id,
            session.id
        );
    }
    assert_eq!(codes.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_create_one_participant() {
    let (store, _) = seeded_store().await;
    let engine = Arc::new(bank_engine(store));
    let session_id = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap().id;

    let mut set = JoinSet::new();
    for _ in 0..16 {
        let engine = engine.clone();
        set.spawn(async move { engine.join(session_id, 2).await });
    }

    let mut fresh = 0;
    while let Some(result) = set.join_next().await {
        if !result.unwrap().unwrap().already_joined {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(engine.status(session_id).await.unwrap().participants_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_have_one_winner() {
    let (store, ids) = seeded_store().await;
    let engine = Arc::new(bank_engine(store));
    let session_id = engine.create_session(HOST, &bank_request("5.5", None)).await.unwrap().id;
    engine.join(session_id, 2).await.unwrap();
    engine.start(session_id, HOST).await.unwrap();

    let mut set = JoinSet::new();
    for i in 0..16 {
        let engine = engine.clone();
        let selected = if i % 2 == 0 { "b" } else { "a" };
        let req = submit_request(vec![(QuestionId::Bank(ids[0]), selected)], i);
        set.spawn(async move { engine.submit(session_id, 2, &req).await });
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(outcome) => winners.push(outcome),
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 15);

    let review = engine.review(session_id, 2).await.unwrap();
    assert_eq!(review.score, winners[0].score);
}
