use std::sync::Arc;

use serde_json::json;

use ontomap::dag::{Orchestrator, OrchestratorConfig};
use ontomap::discovery::{
    Cardinality, CandidateStatus, DetectionMethod, RelationshipCandidate, UserDecision,
};
use ontomap::llm::StaticModelClient;
use ontomap::profile::{ColumnInfo, ColumnRef, InMemoryProfiler, PrimaryKeyInfo, TableMetadata, TableRef};
use ontomap::service::{DetectionService, ServiceError};
use ontomap::store::OntologyStore;
use ontomap::workflow::WorkflowState;

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        position: 0,
        data_type: data_type.to_string(),
        is_nullable: false,
    }
}

fn make_profiler() -> InMemoryProfiler {
    let mut profiler = InMemoryProfiler::new();

    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "orders".to_string(),
        columns: vec![column("id", "integer"), column("customer_id", "integer")],
        primary_key: Some(PrimaryKeyInfo {
            name: "pk_orders".to_string(),
            columns: vec!["id".to_string()],
        }),
        foreign_keys: vec![],
    });
    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "customers".to_string(),
        columns: vec![column("id", "integer"), column("name", "varchar")],
        primary_key: Some(PrimaryKeyInfo {
            name: "pk_customers".to_string(),
            columns: vec!["id".to_string()],
        }),
        foreign_keys: vec![],
    });
    // An island: nothing references it
    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "audit_log".to_string(),
        columns: vec![column("id", "integer"), column("message", "varchar")],
        primary_key: Some(PrimaryKeyInfo {
            name: "pk_audit_log".to_string(),
            columns: vec!["id".to_string()],
        }),
        foreign_keys: vec![],
    });

    let orders = TableRef::new("public", "orders");
    let customers = TableRef::new("public", "customers");
    let audit = TableRef::new("public", "audit_log");

    profiler.set_column_values(
        &customers,
        "id",
        (1..=10).map(|i| i.to_string()).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &customers,
        "name",
        (1..=10).map(|i| format!("customer {}", i)).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &orders,
        "id",
        (1..=100).map(|i| i.to_string()).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &orders,
        "customer_id",
        (0..100).map(|i| ((i % 10) + 1).to_string()).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &audit,
        "id",
        (1..=5).map(|i| i.to_string()).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &audit,
        "message",
        (1..=5).map(|i| format!("event {}", i)).collect::<Vec<_>>(),
    );

    profiler
}

fn make_model() -> StaticModelClient {
    let model = StaticModelClient::new();
    model.push_response(
        "discover_entity",
        json!({"entity": "thing", "description": "a record", "confidence": 0.8}),
    );
    model.push_response(
        "enrich_entity",
        json!({"description": "enriched", "confidence": 0.9}),
    );
    model.push_response(
        "classify_column",
        json!({"purpose": "generic", "confidence": 0.8}),
    );
    model.push_response(
        "enrich_glossary",
        json!({"definition": "defined", "synonyms": []}),
    );
    model
}

fn make_service(store: &Arc<OntologyStore>) -> DetectionService {
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(store),
        Arc::new(make_profiler()),
        Arc::new(make_model()),
        OrchestratorConfig::default(),
    ));
    DetectionService::new(Arc::clone(store), orchestrator, "p1")
}

fn review_band_candidate(id: &str) -> RelationshipCandidate {
    RelationshipCandidate {
        id: id.to_string(),
        project_id: "p1".to_string(),
        datasource_id: "ds1".to_string(),
        source: ColumnRef::new("public", "orders", "warehouse_id"),
        target: ColumnRef::new("public", "warehouses", "id"),
        detection_method: DetectionMethod::ValueMatch,
        confidence: 0.6,
        value_match_rate: Some(0.7),
        name_similarity: None,
        cardinality: Cardinality::ManyToOne,
        join_match_rate: None,
        orphan_rate: None,
        target_coverage: None,
        matched_rows: None,
        orphan_rows: None,
        status: CandidateStatus::Pending,
        is_required: true,
        user_decision: None,
        rejection_reason: None,
        updated_at: 0,
    }
}

#[tokio::test]
async fn test_detection_and_status_counts() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    let workflow = service.run_detection("ds1").await.unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);

    let (workflow, counts) = service.status_with_counts("ds1").unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);
    assert_eq!(counts.confirmed, 1);
    assert_eq!(counts.needs_review, 0);
    assert!(counts.can_save);
    assert!(counts.entities >= 1);
    assert!(counts.occurrences >= 2);
    // orders+customers linked, audit_log alone
    assert_eq!(counts.islands, 2);
}

#[tokio::test]
async fn test_candidates_grouped_and_save() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    let workflow = service.run_detection("ds1").await.unwrap();

    let grouped = service.candidates_grouped("ds1").unwrap();
    assert_eq!(grouped.confirmed.len(), 1);
    assert!(grouped.can_save());

    let saved = service.save_relationships(&workflow.id).unwrap();
    assert_eq!(saved, 1);
    assert_eq!(store.saved_relationship_count("ds1").unwrap(), 1);
}

#[tokio::test]
async fn test_save_requires_completed_workflow() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    let workflow = store.create_workflow("p1", "ds1").unwrap();
    let err = service.save_relationships(&workflow.id).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn test_decision_completes_awaiting_workflow() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    // A workflow stuck awaiting input on one review-band candidate
    let workflow = store.create_workflow("p1", "ds1").unwrap();
    store
        .update_workflow_state(&workflow.id, WorkflowState::Running, None)
        .unwrap();
    store
        .update_workflow_state(&workflow.id, WorkflowState::AwaitingInput, None)
        .unwrap();
    store.upsert_candidate(&review_band_candidate("c1")).unwrap();

    let (_, counts) = service.status_with_counts("ds1").unwrap();
    assert_eq!(counts.needs_review, 1);
    assert!(!counts.can_save);

    let decided = service
        .update_candidate_decision("ds1", "c1", UserDecision::Accepted)
        .unwrap();
    assert_eq!(decided.status, CandidateStatus::Accepted);

    // The last decision completed the workflow
    let (workflow, counts) = service.status_with_counts("ds1").unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);
    assert!(counts.can_save);
    assert_eq!(counts.confirmed, 1);
}

#[tokio::test]
async fn test_decision_rejects_foreign_datasource() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    store.upsert_candidate(&review_band_candidate("c1")).unwrap();

    let err = service
        .update_candidate_decision("other-ds", "c1", UserDecision::Accepted)
        .unwrap_err();
    assert!(matches!(err, ServiceError::WrongDatasource { .. }));
}

#[tokio::test]
async fn test_entities_and_summary() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    service.run_detection("ds1").await.unwrap();

    let entities = service.entities_with_occurrences("ds1").unwrap();
    assert!(!entities.is_empty());
    let customer = entities
        .iter()
        .find(|e| e.entity.name == "customer")
        .expect("customer entity materialized");
    assert_eq!(customer.occurrences.len(), 2);

    let summary = service.ontology_summary("ds1").unwrap();
    assert_eq!(summary.project_id, "p1");
    assert_eq!(summary.relationship_count, 1);
    assert_eq!(summary.islands, 2);

    let entity = summary
        .entities
        .iter()
        .find(|e| e.name == "customer")
        .unwrap();
    assert!(entity
        .occurrences
        .iter()
        .any(|o| o.location == "public.orders.customer_id"));
}

#[tokio::test]
async fn test_cancel_without_active_dag_fails_workflow() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let service = make_service(&store);

    let workflow = store.create_workflow("p1", "ds1").unwrap();
    service.cancel(&workflow.id).unwrap();

    let workflow = store.get_workflow(&workflow.id).unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);
    assert_eq!(workflow.error_message.as_deref(), Some("cancelled by user"));
}
