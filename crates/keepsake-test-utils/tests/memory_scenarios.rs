// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end memory behavior over the full service stack.

use std::time::Duration;

use keepsake_config::model::MemoryConfig;
use keepsake_core::VectorIndexAdapter;
use keepsake_memory::{ListFilter, MemoryCategory, Role};
use keepsake_test_utils::{harness_epoch, record, TestHarness};

const WAIT: Duration = Duration::from_secs(10);

fn extraction(items: &[(&str, &str, f64)]) -> String {
    let memories: Vec<serde_json::Value> = items
        .iter()
        .map(|(content, category, importance)| {
            serde_json::json!({
                "content": content,
                "category": category,
                "importance": importance,
            })
        })
        .collect();
    serde_json::json!({ "memories": memories }).to_string()
}

#[tokio::test]
async fn preference_is_extracted_after_idle_timeout() {
    let h = TestHarness::with_responses(vec![extraction(&[(
        "User prefers dark mode",
        "preference",
        0.6,
    )])])
    .await
    .unwrap();

    h.service.submit_turn(Role::User, "I prefer dark mode", "cli").await;
    h.service
        .submit_turn(Role::Assistant, "Got it, dark mode from now on.", "cli")
        .await;
    assert_eq!(h.provider.call_count().await, 0, "nothing runs before the idle timeout");

    assert!(h.wait_for_records(1, WAIT).await);
    assert!(h.wait_until_idle(WAIT).await);

    let records = h.service.list_memories(&ListFilter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    let stored = &records[0];
    assert_eq!(stored.content, "User prefers dark mode");
    assert_eq!(stored.category, MemoryCategory::Preference);
    assert_eq!(stored.importance, 0.6);
    assert_eq!(stored.source_type, "cli");

    let vector = h.index.embed("User prefers dark mode").await.unwrap();
    let hits = h.vectors.search(&h.collection, &vector, 10, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, stored.id);
    assert_eq!(hits[0].payload["type"], "memory");
    assert_eq!(hits[0].payload["category"], "preference");

    let transcripts = h.provider.transcripts().await;
    assert_eq!(transcripts.len(), 1);
    assert!(transcripts[0].contains("User: I prefer dark mode"));
    assert!(transcripts[0].contains("Assistant: Got it, dark mode from now on."));
}

#[tokio::test]
async fn near_duplicate_boosts_existing_record() {
    let h = TestHarness::with_responses(vec![extraction(&[(
        "The user prefers dark mode",
        "preference",
        0.6,
    )])])
    .await
    .unwrap();
    h.seed(
        &record("existing", "User prefers dark mode", MemoryCategory::Preference),
        &[1.0],
    )
    .await
    .unwrap();
    h.embedder
        .set("The user prefers dark mode", &[0.95, 0.312_25])
        .await;

    h.service.submit_turn(Role::User, "Dark mode please, always", "cli").await;
    let report = h.service.force_flush().await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.stored, 0);
    assert_eq!(h.service.count(true).await.unwrap(), 1);
    let existing = h.service.get_memory("existing").await.unwrap().unwrap();
    assert!((existing.importance - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn contradiction_supersedes_and_hides_old_value() {
    let h = TestHarness::with_responses(vec![extraction(&[(
        "Project deadline is Friday",
        "temporal",
        0.7,
    )])])
    .await
    .unwrap();
    let mut monday = record("monday", "Project deadline is Monday", MemoryCategory::Temporal);
    monday.expires_at = Some(harness_epoch() + chrono::Duration::days(5));
    h.seed(&monday, &[0.0, 1.0]).await.unwrap();
    h.embedder
        .set("Project deadline is Friday", &[0.0, 0.98, 0.199])
        .await;
    h.embedder
        .set("when is the project deadline", &[0.0, 1.0, 0.1])
        .await;

    h.service
        .submit_turn(Role::User, "The deadline moved to Friday", "cli")
        .await;
    let report = h.service.force_flush().await;
    assert_eq!(report.superseded, 1);

    let old = h.service.get_memory("monday").await.unwrap().unwrap();
    let new_id = old.superseded_by.clone().expect("old record points at its successor");
    let new = h.service.get_memory(&new_id).await.unwrap().unwrap();
    assert_eq!(new.content, "Project deadline is Friday");

    let context = h
        .service
        .query_memories("when is the project deadline", 5, 0.0)
        .await;
    let ids: Vec<&str> = context.memories.iter().map(|m| m.record.id.as_str()).collect();
    assert_eq!(ids, [new_id.as_str()]);
    assert!(context.text.contains("[temporal] Project deadline is Friday"));
    assert!(!context.text.contains("Monday"));
}

#[tokio::test]
async fn relevant_memory_outranks_older_unrelated_one() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();

    let mut theme = record("theme", "User prefers dark mode", MemoryCategory::Preference);
    theme.importance = 0.6;
    h.seed(&theme, &[1.0]).await.unwrap();

    let mut lunch = record("lunch", "User had pasta for lunch", MemoryCategory::Factual);
    lunch.importance = 0.2;
    lunch.created_at = harness_epoch() - chrono::Duration::days(45);
    lunch.last_accessed = lunch.created_at;
    h.seed(&lunch, &[0.3, 0.0, 0.0, 0.954]).await.unwrap();

    h.embedder
        .set("what editor theme do I like", &[0.9, 0.1])
        .await;

    let context = h
        .service
        .query_memories("what editor theme do I like", 5, 0.0)
        .await;
    assert_eq!(context.memories.len(), 2);
    assert_eq!(context.memories[0].record.id, "theme");
    assert!(context.memories[0].score > 0.4);
    assert!(context.memories[0].score > context.memories[1].score);
    assert!(context.text.starts_with("## Relevant Memories\n[preference] User prefers dark mode"));
}

#[tokio::test]
async fn maintenance_prunes_only_stale_low_importance() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();

    let mut stale = record("stale", "User once mentioned a podcast", MemoryCategory::Factual);
    stale.importance = 0.05;
    stale.created_at = harness_epoch() - chrono::Duration::days(120);
    stale.last_accessed = harness_epoch() - chrono::Duration::days(100);
    h.seed(&stale, &[0.0, 0.0, 1.0]).await.unwrap();

    let mut recent = record("recent", "User mentioned a film", MemoryCategory::Factual);
    recent.importance = 0.05;
    recent.created_at = harness_epoch() - chrono::Duration::days(20);
    recent.last_accessed = harness_epoch() - chrono::Duration::days(10);
    h.seed(&recent, &[0.0, 0.0, 0.0, 1.0]).await.unwrap();

    let result = h.service.run_maintenance(0.95, 0.1, 90).await;

    assert_eq!(result.pruned, 1);
    assert!(result.errors.is_empty());
    assert!(h.service.get_memory("stale").await.unwrap().is_none());
    assert!(h.service.get_memory("recent").await.unwrap().is_some());
    assert!(h.indexed_ids(&[0.0, 0.0, 1.0]).await.unwrap().iter().all(|id| id != "stale"));
}

#[tokio::test]
async fn repeated_extraction_is_idempotent() {
    let response = extraction(&[("User lives in Lisbon", "factual", 0.7)]);
    let h = TestHarness::with_responses(vec![response.clone(), response])
        .await
        .unwrap();

    h.service.submit_turn(Role::User, "I live in Lisbon", "cli").await;
    let first = h.service.force_flush().await;
    h.service
        .submit_turn(Role::User, "Did I mention I live in Lisbon?", "cli")
        .await;
    let second = h.service.force_flush().await;

    assert_eq!(first.stored, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(h.service.count(true).await.unwrap(), 1);
}

#[tokio::test]
async fn rapid_turns_coalesce_into_one_cycle() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();

    for i in 0..5 {
        h.service
            .submit_turn(Role::User, &format!("message number {i}"), "cli")
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(h.provider.call_count().await, 0);

    let deadline = tokio::time::Instant::now() + WAIT;
    while h.provider.call_count().await == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.wait_until_idle(WAIT).await);
    tokio::time::sleep(h.idle + Duration::from_millis(300)).await;

    assert_eq!(h.provider.call_count().await, 1);
    let transcript = &h.provider.transcripts().await[0];
    for i in 0..5 {
        assert!(transcript.contains(&format!("message number {i}")));
    }
}

#[tokio::test]
async fn turns_during_a_cycle_are_not_lost() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();
    h.provider.set_delay(Duration::from_millis(500)).await;

    h.service.submit_turn(Role::User, "first batch", "cli").await;
    let deadline = tokio::time::Instant::now() + WAIT;
    while h.provider.call_count().await == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(h.service.is_processing());

    h.service.submit_turn(Role::User, "second batch", "cli").await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while h.provider.call_count().await < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.wait_until_idle(WAIT).await);

    let transcripts = h.provider.transcripts().await;
    assert_eq!(transcripts.len(), 2);
    assert!(transcripts[0].contains("first batch") && !transcripts[0].contains("second batch"));
    assert!(transcripts[1].contains("second batch") && !transcripts[1].contains("first batch"));
}

#[tokio::test]
async fn superseded_history_survives_maintenance() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();

    let current = record("current", "User drives a hatchback", MemoryCategory::Factual);
    h.seed(&current, &[1.0]).await.unwrap();
    let mut history = record("history", "User drives a sedan", MemoryCategory::Factual);
    history.importance = 0.01;
    history.created_at = harness_epoch() - chrono::Duration::days(300);
    history.last_accessed = harness_epoch() - chrono::Duration::days(200);
    history.superseded_by = Some("current".to_string());
    h.store.insert(&history).await.unwrap();

    let result = h.service.run_maintenance(0.5, 0.1, 90).await;
    assert_eq!(result.pruned, 0);
    assert_eq!(result.purged_history, 0);

    let kept = h.service.get_memory("history").await.unwrap().unwrap();
    assert_eq!(kept.importance, 0.01);
    assert_eq!(kept.superseded_by.as_deref(), Some("current"));
}

#[tokio::test]
async fn document_chunks_are_invisible_to_memory() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();
    h.seed_foreign_point("doc-chunk-1", "document", &[1.0]).await.unwrap();
    h.embedder.set("User uses a standing desk", &[1.0]).await;
    h.embedder.set("desk setup", &[1.0]).await;

    let outcome = h
        .service
        .remember("User uses a standing desk", None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, keepsake_memory::ConsolidationOutcome::Stored { .. }));

    let context = h.service.query_memories("desk setup", 5, 0.0).await;
    let ids: Vec<&str> = context.memories.iter().map(|m| m.record.id.as_str()).collect();
    assert_eq!(ids, [outcome.record_id()]);
    assert_eq!(h.vectors.count(&h.collection).await.unwrap(), 2);
}

#[tokio::test]
async fn failed_extraction_degrades_to_nothing() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();
    h.provider.add_failure("upstream 503").await;
    h.provider.add_response("Sorry, I can't produce JSON today.").await;
    h.provider
        .add_response(extraction(&[("User's birthday is May 4", "factual", 0.8)]))
        .await;

    h.service.submit_turn(Role::User, "My birthday is May 4", "cli").await;
    let failed = h.service.force_flush().await;
    assert_eq!(failed.turns, 1);
    assert_eq!(failed.candidates, 0);

    h.service.submit_turn(Role::User, "It's on May 4", "cli").await;
    let malformed = h.service.force_flush().await;
    assert_eq!(malformed.candidates, 0);

    h.service.submit_turn(Role::User, "May 4, remember?", "cli").await;
    let ok = h.service.force_flush().await;
    assert_eq!(ok.stored, 1);
    assert_eq!(h.service.count(false).await.unwrap(), 1);
}

#[tokio::test]
async fn explicit_memories_skip_the_buffer() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();

    let outcome = h
        .service
        .remember(
            "Remember that my cat is called Miso",
            Some(MemoryCategory::Relationship),
            None,
        )
        .await
        .unwrap();
    let stored = h.service.get_memory(outcome.record_id()).await.unwrap().unwrap();
    assert_eq!(stored.content, "my cat is called Miso");
    assert_eq!(stored.source_type, "explicit");
    assert_eq!(stored.category, MemoryCategory::Relationship);
    assert_eq!(stored.importance, 0.8);
    assert_eq!(h.provider.call_count().await, 0);

    assert!(h.service.remember("remember that", None, None).await.is_err());
}

#[tokio::test]
async fn temporal_memories_expire() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();
    h.embedder.set("Dentist appointment on Tuesday", &[0.0, 1.0]).await;
    h.embedder.set("dentist", &[0.0, 1.0]).await;

    let outcome = h
        .service
        .remember("Dentist appointment on Tuesday", Some(MemoryCategory::Temporal), Some(0.7))
        .await
        .unwrap();
    let stored = h.service.get_memory(outcome.record_id()).await.unwrap().unwrap();
    assert_eq!(stored.expires_at, Some(harness_epoch() + chrono::Duration::days(7)));

    assert_eq!(h.service.query_memories("dentist", 5, 0.0).await.memories.len(), 1);
    h.clock.advance(chrono::Duration::days(8));
    assert!(h.service.query_memories("dentist", 5, 0.0).await.is_empty());

    let result = h.service.run_maintenance(0.95, 0.1, 90).await;
    assert_eq!(result.expired, 1);
    assert_eq!(h.service.count(true).await.unwrap(), 0);
    assert_eq!(h.vectors.count(&h.collection).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_removes_record_and_vector() {
    let h = TestHarness::with_responses(vec![]).await.unwrap();
    h.seed(&record("gone", "User collects stamps", MemoryCategory::Factual), &[1.0])
        .await
        .unwrap();

    assert!(h.service.delete_memory("gone").await.unwrap());
    assert!(!h.service.delete_memory("gone").await.unwrap());
    assert!(h.service.get_memory("gone").await.unwrap().is_none());
    assert!(h.indexed_ids(&[1.0]).await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_flushes_pending_turns() {
    let h = TestHarness::with_responses(vec![extraction(&[(
        "User is learning Portuguese",
        "factual",
        0.6,
    )])])
    .await
    .unwrap();

    h.service
        .submit_turn(Role::User, "I'm learning Portuguese", "cli")
        .await;
    let report = h.service.shutdown().await;

    assert_eq!(report.turns, 1);
    assert_eq!(report.stored, 1);
    assert_eq!(h.service.pending_turns().await, 0);
}

#[tokio::test]
async fn disabled_memory_ignores_turns_and_queries() {
    let h = TestHarness::builder()
        .with_memory_config(MemoryConfig {
            enabled: false,
            ..MemoryConfig::default()
        })
        .build()
        .await
        .unwrap();

    h.service.submit_turn(Role::User, "I prefer dark mode", "cli").await;
    assert_eq!(h.service.pending_turns().await, 0);
    assert!(h.service.query_memories("theme", 5, 0.0).await.is_empty());
}
