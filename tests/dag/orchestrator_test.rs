use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ontomap::classify::ClassificationPath;
use ontomap::dag::{
    DagError, DagStatus, NodeProgress, NodeStatus, Orchestrator, OrchestratorConfig,
};
use ontomap::discovery::CandidateStatus;
use ontomap::llm::{ClassifyRequest, ModelClient, ModelError, ModelResponse, ModelResult, StaticModelClient};
use ontomap::profile::{
    ColumnInfo, ColumnRef, InMemoryProfiler, PrimaryKeyInfo, ProfilerProviderExt, TableMetadata,
    TableRef,
};
use ontomap::store::OntologyStore;
use ontomap::workflow::WorkflowState;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        position: 0,
        data_type: data_type.to_string(),
        is_nullable: false,
    }
}

/// Two cleanly linked tables: orders.customer_id -> customers.id.
fn make_profiler() -> InMemoryProfiler {
    let mut profiler = InMemoryProfiler::new();

    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "orders".to_string(),
        columns: vec![
            column("id", "integer"),
            column("customer_id", "integer"),
            column("status", "varchar(1)"),
        ],
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

    let orders = TableRef::new("public", "orders");
    let customers = TableRef::new("public", "customers");

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

    let mut order_ids = Vec::new();
    let mut refs = Vec::new();
    let mut status = Vec::new();
    for i in 0..100usize {
        order_ids.push((i + 1).to_string());
        refs.push(((i % 10) + 1).to_string());
        status.push(if i % 4 == 0 { "C" } else { "A" }.to_string());
    }
    profiler.set_column_values(&orders, "id", order_ids);
    profiler.set_column_values(&orders, "customer_id", refs);
    profiler.set_column_values(&orders, "status", status);

    profiler
}

fn make_model() -> StaticModelClient {
    let model = StaticModelClient::new();
    model.push_response(
        "discover_entity",
        json!({"entity": "thing", "description": "a business record", "confidence": 0.8}),
    );
    model.push_response(
        "enrich_entity",
        json!({"description": "an enriched concept", "confidence": 0.9}),
    );
    model.push_response(
        "classify_column",
        json!({"purpose": "generic purpose", "confidence": 0.8}),
    );
    model.push_response(
        "enrich_glossary",
        json!({"definition": "a glossary definition", "synonyms": ["alias"]}),
    );
    model
}

fn make_orchestrator(
    store: &Arc<OntologyStore>,
    model: Arc<dyn ModelClient>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(store),
        Arc::new(make_profiler()),
        model,
        OrchestratorConfig::default(),
    )
}

#[tokio::test]
async fn test_full_run_completes_all_nodes() {
    init_tracing();
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let orchestrator = make_orchestrator(&store, Arc::new(make_model()));

    let dag = orchestrator.start("p1", "ds1").await.unwrap();
    assert_eq!(dag.status, DagStatus::Completed);
    assert!(dag.owner_id.is_none(), "lease released after the run");

    let nodes = store.list_nodes(&dag.id).unwrap();
    assert_eq!(nodes.len(), 9);
    assert!(nodes.iter().all(|n| n.status == NodeStatus::Completed));

    // The clean reference was discovered and accepted
    let candidates = store.list_candidates("ds1").unwrap();
    assert!(candidates
        .iter()
        .any(|c| c.source.column == "customer_id" && c.status == CandidateStatus::Accepted));

    // Entities and glossary terms materialized
    assert!(!store.list_entities("p1").unwrap().is_empty());
    assert!(!store.list_glossary_terms("p1").unwrap().is_empty());

    // Columns classified and stored
    let status = store
        .get_column_metadata("p1", &ColumnRef::new("public", "orders", "status"))
        .unwrap()
        .unwrap();
    assert_eq!(status.path, ClassificationPath::Enum);

    // Workflow completed; ephemeral entity state cleaned up
    let workflow = store.latest_workflow("p1", "ds1").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Completed);
    assert!(store.list_entity_states(&workflow.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_skips_completed_nodes() {
    init_tracing();
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let profiler = Arc::new(make_profiler());

    // Simulate a previous owner that died after node 4 completed
    let tables = profiler.get_all_tables().await.unwrap();
    let fingerprint = profiler.schema_fingerprint(&tables);
    let dag = store.create_dag("p1", "ds1", &fingerprint).unwrap();
    for order in 1..=4 {
        store
            .update_node_status(&dag.id, order, NodeStatus::Completed, None)
            .unwrap();
        store
            .set_node_progress(
                &dag.id,
                order,
                &NodeProgress {
                    current: 1,
                    total: 1,
                    message: "seeded".to_string(),
                },
            )
            .unwrap();
    }
    store.set_current_node(&dag.id, 4).unwrap();

    let model = Arc::new(make_model());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&profiler) as Arc<dyn ontomap::profile::ProfilerProvider>,
        Arc::clone(&model) as Arc<dyn ModelClient>,
        OrchestratorConfig::default(),
    );

    let resumed = orchestrator.start("p1", "ds1").await.unwrap();
    assert_eq!(resumed.id, dag.id, "resumes the existing dag");
    assert_eq!(resumed.status, DagStatus::Completed);

    // Nodes 1-4 were not re-executed: their seeded progress is untouched
    for order in 1..=4 {
        let node = store.get_node(&dag.id, order).unwrap();
        assert_eq!(node.status, NodeStatus::Completed);
        assert_eq!(node.progress.message, "seeded");
    }
    for order in 5..=9 {
        let node = store.get_node(&dag.id, order).unwrap();
        assert_eq!(node.status, NodeStatus::Completed);
        assert_ne!(node.progress.message, "seeded");
    }

    // Stages 1, 2 and 4 never called the model
    let calls = model.calls();
    assert!(!calls.iter().any(|c| c == "discover_entity"));
    assert!(!calls.iter().any(|c| c == "enrich_entity"));
    assert!(!calls.iter().any(|c| c == "classify_column"));
}

#[tokio::test]
async fn test_fingerprint_change_invalidates_completed_nodes() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());

    // DAG completed node 1 against a schema that no longer exists
    let dag = store.create_dag("p1", "ds1", "stale-fingerprint").unwrap();
    store
        .update_node_status(&dag.id, 1, NodeStatus::Completed, None)
        .unwrap();
    store
        .set_node_progress(
            &dag.id,
            1,
            &NodeProgress {
                current: 1,
                total: 1,
                message: "seeded".to_string(),
            },
        )
        .unwrap();

    let model = Arc::new(make_model());
    let orchestrator = make_orchestrator(&store, Arc::clone(&model) as Arc<dyn ModelClient>);
    let finished = orchestrator.start("p1", "ds1").await.unwrap();
    assert_eq!(finished.status, DagStatus::Completed);

    // Node 1 was invalidated and re-run: the model saw entity discovery
    // and the seeded progress was overwritten
    assert!(model.calls().iter().any(|c| c == "discover_entity"));
    let node = store.get_node(&dag.id, 1).unwrap();
    assert_ne!(node.progress.message, "seeded");
}

#[tokio::test]
async fn test_lease_contention() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let profiler = Arc::new(make_profiler());

    let tables = profiler.get_all_tables().await.unwrap();
    let fingerprint = profiler.schema_fingerprint(&tables);
    let dag = store.create_dag("p1", "ds1", &fingerprint).unwrap();

    // Another instance holds a fresh lease
    assert!(store.try_acquire_lease(&dag.id, "other-instance", 60).unwrap());

    let orchestrator = make_orchestrator(&store, Arc::new(make_model()));
    let err = orchestrator.start("p1", "ds1").await.unwrap_err();
    assert!(matches!(err, DagError::LeaseHeld { .. }));

    // The foreign lease is untouched
    let dag = store.get_dag(&dag.id).unwrap();
    assert_eq!(dag.owner_id.as_deref(), Some("other-instance"));
}

/// Model client that cancels the DAG from inside the first stage call.
struct CancellingModel {
    inner: StaticModelClient,
    store: Arc<OntologyStore>,
}

#[async_trait]
impl ModelClient for CancellingModel {
    async fn classify(&self, request: ClassifyRequest) -> ModelResult<ModelResponse> {
        if request.task == "discover_entity" {
            if let Some(dag) = self.store.find_active_dag("p1", "ds1").unwrap() {
                self.store
                    .update_dag_status(&dag.id, DagStatus::Cancelled, None)
                    .unwrap();
            }
        }
        self.inner.classify(request).await
    }
}

#[tokio::test]
async fn test_cancellation_observed_at_node_boundary() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = CancellingModel {
        inner: make_model(),
        store: Arc::clone(&store),
    };

    let orchestrator = make_orchestrator(&store, Arc::new(model));
    let err = orchestrator.start("p1", "ds1").await.unwrap_err();
    assert!(matches!(err, DagError::Cancelled));

    let dag = store.latest_dag("p1", "ds1").unwrap().unwrap();
    assert_eq!(dag.status, DagStatus::Cancelled);

    // The in-flight node finished; cancellation was only seen at the
    // boundary before node 2
    let nodes = store.list_nodes(&dag.id).unwrap();
    assert_eq!(nodes[0].status, NodeStatus::Completed);
    assert_eq!(nodes[1].status, NodeStatus::Pending);

    let workflow = store.latest_workflow("p1", "ds1").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);
    assert_eq!(workflow.error_message.as_deref(), Some("cancelled by user"));
}

/// Model client whose classify_column calls hit a permanent auth failure.
struct AuthFailingModel {
    inner: StaticModelClient,
}

#[async_trait]
impl ModelClient for AuthFailingModel {
    async fn classify(&self, request: ClassifyRequest) -> ModelResult<ModelResponse> {
        if request.task == "classify_column" {
            return Err(ModelError::AuthFailed("key revoked".to_string()));
        }
        self.inner.classify(request).await
    }
}

#[tokio::test]
async fn test_permanent_error_fails_node_and_dag() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = AuthFailingModel {
        inner: make_model(),
    };

    let orchestrator = make_orchestrator(&store, Arc::new(model));
    let err = orchestrator.start("p1", "ds1").await.unwrap_err();
    assert!(matches!(err, DagError::Model(_) | DagError::Classify(_)));

    let dag = store.latest_dag("p1", "ds1").unwrap().unwrap();
    assert_eq!(dag.status, DagStatus::Failed);
    assert!(dag.error_message.is_some());

    let nodes = store.list_nodes(&dag.id).unwrap();
    // Stages before column enrichment completed; column enrichment failed
    // without burning retries (permanent errors are not retried)
    assert_eq!(nodes[0].status, NodeStatus::Completed);
    assert_eq!(nodes[3].status, NodeStatus::Failed);
    assert_eq!(nodes[3].retry_count, 0);
    assert!(nodes[3].error_message.is_some());

    let workflow = store.latest_workflow("p1", "ds1").unwrap().unwrap();
    assert_eq!(workflow.state, WorkflowState::Failed);
}
