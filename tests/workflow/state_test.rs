use serde_json::json;

use ontomap::store::hash::content_hash;
use ontomap::store::OntologyStore;
use ontomap::workflow::{
    AnswerEffect, EntityScope, EntityStatus, EntityTracker, Task, TaskKind, TaskQueue,
    WorkflowState,
};

const ALL_ENTITY: [EntityStatus; 7] = [
    EntityStatus::Pending,
    EntityStatus::Scanning,
    EntityStatus::Scanned,
    EntityStatus::Analyzing,
    EntityStatus::Complete,
    EntityStatus::NeedsInput,
    EntityStatus::Failed,
];

#[test]
fn test_entity_transitions_exactly_as_listed() {
    use EntityStatus::*;
    let allowed = [
        (Pending, Scanning),
        (Scanning, Scanned),
        (Scanned, Analyzing),
        (Analyzing, Complete),
        (Analyzing, NeedsInput),
        (NeedsInput, Analyzing),
        (Complete, Analyzing),
    ];

    for from in ALL_ENTITY {
        for to in ALL_ENTITY {
            let expected = to == Failed || allowed.contains(&(from, to));
            assert_eq!(
                from.can_transition_to(to),
                expected,
                "transition {} -> {} should be {}",
                from,
                to,
                expected
            );
        }
    }
}

#[test]
fn test_failed_reachable_from_everywhere() {
    for from in ALL_ENTITY {
        assert!(from.can_transition_to(EntityStatus::Failed));
    }
}

#[test]
fn test_workflow_machine_restart_paths() {
    use WorkflowState::*;

    assert!(Pending.can_transition_to(Running));
    assert!(Running.can_transition_to(AwaitingInput));
    assert!(AwaitingInput.can_transition_to(Completed));
    assert!(Completed.can_transition_to(Pending));
    assert!(Failed.can_transition_to(Pending));

    assert!(!AwaitingInput.can_transition_to(Paused));
    assert!(!Completed.can_transition_to(Running));
    assert!(!Pending.can_transition_to(Completed));
}

#[test]
fn test_content_hash_properties() {
    // Deterministic, 16 lowercase hex chars
    let h = content_hash("column_semantics", "status is a lifecycle column");
    assert_eq!(h, content_hash("column_semantics", "status is a lifecycle column"));
    assert_eq!(h.len(), 16);
    assert!(h.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));

    // No collisions over 50+ distinct (category, text) pairs
    let mut seen = std::collections::HashSet::new();
    for i in 0..55 {
        let category = format!("cat_{}", i % 5);
        let text = format!("fact {} about column c{}", i, i * 3 % 11);
        assert!(seen.insert(content_hash(&category, &text)));
    }

    // Either input changing changes the hash
    assert_ne!(content_hash("a", "x"), content_hash("b", "x"));
    assert_ne!(content_hash("a", "x"), content_hash("a", "y"));
}

#[test]
fn test_question_answer_cycle_with_cascade() {
    let store = OntologyStore::open_in_memory().unwrap();
    let tracker = EntityTracker::new(&store, "p1");

    let orders = EntityScope::Table("orders".to_string());
    let shipments = EntityScope::Table("shipments".to_string());

    for scope in [&orders, &shipments] {
        tracker.transition("w1", scope, EntityStatus::Scanning).unwrap();
        tracker.transition("w1", scope, EntityStatus::Scanned).unwrap();
        tracker.transition("w1", scope, EntityStatus::Analyzing).unwrap();
    }
    tracker
        .transition("w1", &shipments, EntityStatus::Complete)
        .unwrap();

    // Question halts orders
    let question = tracker
        .ask("w1", &orders, "Does an order always ship?", None)
        .unwrap();
    assert_eq!(
        store.get_entity_state("w1", &orders).unwrap().unwrap().status,
        EntityStatus::NeedsInput
    );

    // Answer resumes orders and cascades into shipments
    let outcome = tracker
        .record_answer(
            "w1",
            &orders,
            &question.id,
            "only paid orders ship",
            vec![
                AnswerEffect::UpdateGathered {
                    scope: shipments.clone(),
                    patch: json!({"ships_when": "order paid"}),
                },
                AnswerEffect::Reopen {
                    scope: shipments.clone(),
                },
                AnswerEffect::CreateFact {
                    category: "process".to_string(),
                    text: "orders ship after payment".to_string(),
                },
            ],
        )
        .unwrap();

    assert_eq!(outcome.state.status, EntityStatus::Analyzing);

    // Sibling reopened from complete back to analyzing, data patched
    let sibling = store.get_entity_state("w1", &shipments).unwrap().unwrap();
    assert_eq!(sibling.status, EntityStatus::Analyzing);
    assert_eq!(sibling.gathered["ships_when"], "order paid");

    // Knowledge fact stored under its content hash
    let facts = store.list_knowledge_facts("p1").unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(
        facts[0].id,
        content_hash("process", "orders ship after payment")
    );

    // Cleanup deletes entity state but keeps the audit diff
    tracker.cleanup("w1").unwrap();
    assert!(store.list_entity_states("w1").unwrap().is_empty());
    let diffs = store.list_answer_diffs("w1").unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].facts_created.len(), 1);
    assert_eq!(diffs[0].entity_updates.len(), 2);
}

#[test]
fn test_task_queue_bounds_and_order() {
    let tasks: Vec<Task> = ["orders", "customers", "payments", "shipments", "events"]
        .iter()
        .enumerate()
        .map(|(i, name)| Task::new("w1", TaskKind::ProfileTable, i as i32, *name))
        .collect();

    let mut queue = TaskQueue::new(tasks, 2);

    let mut drained = Vec::new();
    while !queue.is_drained() {
        let batch = queue.next_batch();
        assert!(batch.len() <= 2, "batch exceeded the bound");
        if batch.is_empty() {
            break;
        }
        for task in &batch {
            drained.push(task.subject.clone());
            queue.finish(&task.id, true, 3);
        }
    }

    assert_eq!(
        drained,
        vec!["orders", "customers", "payments", "shipments", "events"]
    );
}
