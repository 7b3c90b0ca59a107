mod common;

use common::{assistant, assistant_over, Scripted};
use nlq_assistant::config::{AppConfig, NumeralPolicy};
use nlq_assistant::error::NO_PARAMETERS_MESSAGE;
use nlq_assistant::{AskOutcome, NlqError};
use polars::prelude::*;
use serde_json::json;
use std::time::Duration;

const AMBIGUOUS: &str = "¿qué fecha y hora tiene la descarga 8621?";

fn answer_rows(outcome: AskOutcome) -> Vec<serde_json::Value> {
    match outcome {
        AskOutcome::Answer { answer } => answer.into_iter().map(|row| json!(row)).collect(),
        other => panic!("expected an answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_keywords_short_circuits_without_session() {
    let generator = Scripted::new(&[]);
    let assistant = assistant(generator.clone());

    let outcome = assistant.ask("alice", "¿qué es?").await.unwrap();
    assert_eq!(
        outcome,
        AskOutcome::Message {
            message: NO_PARAMETERS_MESSAGE.to_string()
        }
    );
    assert!(!assistant.sessions().is_awaiting("alice").await);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_unmatched_keywords_get_the_same_guidance() {
    let generator = Scripted::new(&[]);
    let assistant = assistant(generator.clone());

    let outcome = assistant.ask("alice", "¿cuál es la temperatura del plasma?").await.unwrap();
    assert!(matches!(outcome, AskOutcome::Message { .. }));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_singletons_resolve_in_one_round_trip() {
    let generator = Scripted::new(&["SELECT comentarioDesc FROM data WHERE N_DESCARGA = '8621'"]);
    let assistant = assistant(generator.clone());

    let outcome = assistant
        .ask("alice", "¿cuál es el comentario para la descarga 8621?")
        .await
        .unwrap();
    assert_eq!(answer_rows(outcome), vec![json!({"comentarioDesc": "buena descarga"})]);
    assert_eq!(generator.calls(), 1);
    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("Available columns: comentarioDesc, N_DESCARGA."));
    assert!(!assistant.sessions().is_awaiting("alice").await);
}

#[tokio::test]
async fn test_ambiguous_keywords_prompt_before_any_synthesis() {
    let generator = Scripted::new(&[]);
    let assistant = assistant(generator.clone());

    let outcome = assistant.ask("alice", AMBIGUOUS).await.unwrap();
    assert_eq!(
        outcome,
        AskOutcome::Clarification {
            clarification: vec![
                "fecha: fecha, fecha_registro".to_string(),
                "hora: hora, hora_fin".to_string(),
            ]
        }
    );
    assert!(assistant.sessions().is_awaiting("alice").await);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_answer_resolves_ambiguous_keywords_in_order() {
    let generator = Scripted::new(&[
        "```sql\nSELECT fecha_registro, hora_fin FROM data WHERE N_DESCARGA = '8621';\n```",
    ]);
    let assistant = assistant(generator.clone());

    assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let outcome = assistant.ask("alice", "fecha_registro, hora_fin").await.unwrap();

    assert_eq!(
        answer_rows(outcome),
        vec![json!({"fecha_registro": "2004-05-12", "hora_fin": "10:16"})]
    );
    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains(AMBIGUOUS));
    assert!(prompt.contains("Available columns: fecha_registro, hora_fin, N_DESCARGA."));
    assert!(!assistant.sessions().is_awaiting("alice").await);
}

#[tokio::test]
async fn test_partial_answer_asks_for_the_rest() {
    let generator = Scripted::new(&["SELECT fecha, hora FROM data WHERE N_DESCARGA = '8622'"]);
    let assistant = assistant(generator.clone());

    assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let outcome = assistant.ask("alice", "fecha").await.unwrap();
    assert_eq!(
        outcome,
        AskOutcome::Clarification {
            clarification: vec!["hora: hora, hora_fin".to_string()]
        }
    );
    assert_eq!(generator.calls(), 0);

    let outcome = assistant.ask("alice", "hora").await.unwrap();
    assert_eq!(answer_rows(outcome), vec![json!({"fecha": "2004-05-11", "hora": "11:40"})]);
    assert!(generator.last_prompt().unwrap().contains("Available columns: fecha, hora, N_DESCARGA."));
}

#[tokio::test]
async fn test_too_many_values_keep_the_pending_question() {
    let generator = Scripted::new(&["SELECT fecha, hora FROM data WHERE N_DESCARGA = '8623'"]);
    let assistant = assistant(generator.clone());

    assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let err = assistant.ask("alice", "fecha, hora, hora_fin").await.unwrap_err();
    assert!(matches!(
        err,
        NlqError::TooManyClarificationValues { given: 3, expected: 2 }
    ));
    assert_eq!(err.status_code(), 400);
    assert!(assistant.sessions().is_awaiting("alice").await);

    let outcome = assistant.ask("alice", "fecha, hora").await.unwrap();
    assert_eq!(answer_rows(outcome), vec![json!({"fecha": "2004-06-02", "hora": "09:05"})]);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_sessions_do_not_share_clarifications() {
    let generator = Scripted::new(&[
        "SELECT comentarioDesc FROM data WHERE N_DESCARGA = '8623'",
        "SELECT fecha, hora FROM data WHERE N_DESCARGA = '8621'",
    ]);
    let assistant = assistant(generator.clone());

    let alice_prompt = assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let bob = assistant
        .ask("bob", "¿cuál es el comentario para la descarga 8623?")
        .await
        .unwrap();
    assert_eq!(answer_rows(bob), vec![json!({"comentarioDesc": "disrupción"})]);
    assert!(assistant.sessions().is_awaiting("alice").await);

    let carol_prompt = assistant.ask("carol", AMBIGUOUS).await.unwrap();
    assert_eq!(alice_prompt, carol_prompt);

    let alice = assistant.ask("alice", "fecha, hora").await.unwrap();
    assert_eq!(answer_rows(alice), vec![json!({"fecha": "2004-05-11", "hora": "10:15"})]);
    assert!(assistant.sessions().is_awaiting("carol").await);
}

#[tokio::test]
async fn test_not_found_clears_the_session() {
    let generator = Scripted::new(&["SELECT fecha FROM data WHERE N_DESCARGA = '99999'"]);
    let assistant = assistant(generator.clone());

    assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let err = assistant.ask("alice", "fecha, hora").await.unwrap_err();
    assert!(matches!(err, NlqError::NotFound));
    assert_eq!(err.status_code(), 404);
    assert!(!assistant.sessions().is_awaiting("alice").await);

    // The next message is a fresh question again.
    let outcome = assistant.ask("alice", "¿qué es?").await.unwrap();
    assert!(matches!(outcome, AskOutcome::Message { .. }));
}

#[tokio::test]
async fn test_engine_failure_is_an_execution_error() {
    let generator = Scripted::new(&["SELECT temperatura FROM data"]);
    let assistant = assistant(generator.clone());

    let err = assistant
        .ask("alice", "¿cuál es el comentario para la descarga 8621?")
        .await
        .unwrap_err();
    assert!(matches!(err, NlqError::Execution(_)));
    assert!(err.user_message().starts_with("SQL Execution Error:"));
}

#[tokio::test]
async fn test_completion_without_sql_is_a_synthesis_error() {
    let generator = Scripted::new(&["Lo siento, no puedo responder a eso."]);
    let assistant = assistant(generator.clone());

    assistant.ask("alice", AMBIGUOUS).await.unwrap();
    let err = assistant.ask("alice", "fecha, hora").await.unwrap_err();
    assert!(matches!(err, NlqError::Synthesis(_)));
    assert_eq!(err.user_message(), "Invalid SQL query generated.");
    assert!(!assistant.sessions().is_awaiting("alice").await);
}

#[tokio::test]
async fn test_slow_generator_surfaces_a_timeout() {
    let generator = Scripted::slow("SELECT fecha FROM data", Duration::from_millis(500));
    let assistant = assistant(generator.clone()).with_llm_timeout(Duration::from_millis(20));

    let err = assistant
        .ask("alice", "¿cuál es el comentario para la descarga 8621?")
        .await
        .unwrap_err();
    assert!(matches!(err, NlqError::UpstreamTimeout(_)));
    assert_eq!(err.status_code(), 504);
    assert!(!assistant.sessions().is_awaiting("alice").await);
}

#[tokio::test]
async fn test_comment_for_discharge_with_merged_numeral() {
    let frame = df! [
        "N_DESCARGA" => ["8620", "8621"],
        "fecha" => ["2004-05-10", "2004-05-11"],
        "comentarioDesc" => ["sin incidencias", "buena descarga"]
    ]
    .unwrap();
    let mut config = AppConfig::default();
    config.extractor.numeral_policy = NumeralPolicy::Merge;
    let generator = Scripted::new(&[
        "Here is the query:\n```sql\nSELECT comentarioDesc FROM data WHERE N_DESCARGA = '8621';\n```",
    ]);
    let assistant = assistant_over(frame, &config, generator.clone());

    let report = assistant
        .analyze("¿cuál es el comentario para la descarga 8621?")
        .unwrap();
    assert_eq!(report.keywords, vec!["comentario", "descarga 8621"]);
    assert_eq!(
        report.mapping.iter().collect::<Vec<_>>(),
        vec![("comentario", &["comentarioDesc".to_string()][..])]
    );

    let outcome = assistant
        .ask("alice", "¿cuál es el comentario para la descarga 8621?")
        .await
        .unwrap();
    assert_eq!(answer_rows(outcome), vec![json!({"comentarioDesc": "buena descarga"})]);
    assert!(generator.last_prompt().unwrap().contains("Available columns: comentarioDesc."));
}
