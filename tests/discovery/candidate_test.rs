use std::sync::Arc;

use ontomap::discovery::{
    CandidateStatus, DetectionMethod, DiscoveryConfig, DiscoveryEngine, RejectionReason,
    UserDecision,
};
use ontomap::profile::{
    ColumnInfo, ForeignKeyInfo, InMemoryProfiler, PrimaryKeyInfo, ProfilerProviderExt,
    TableMetadata, TableRef,
};
use ontomap::store::OntologyStore;

fn column(name: &str, data_type: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        position: 0,
        data_type: data_type.to_string(),
        is_nullable: false,
    }
}

fn table(
    name: &str,
    columns: Vec<ColumnInfo>,
    pk: &str,
    foreign_keys: Vec<ForeignKeyInfo>,
) -> TableMetadata {
    TableMetadata {
        schema: "public".to_string(),
        name: name.to_string(),
        columns,
        primary_key: Some(PrimaryKeyInfo {
            name: format!("pk_{}", name),
            columns: vec![pk.to_string()],
        }),
        foreign_keys,
    }
}

/// orders.customer_id cleanly references customers.id;
/// orders.batch_no coincidentally overlaps audit_events.id.
fn make_profiler(orphans: usize) -> InMemoryProfiler {
    let mut profiler = InMemoryProfiler::new();

    profiler.add_table(table(
        "orders",
        vec![
            column("id", "integer"),
            column("customer_id", "integer"),
            column("status", "varchar"),
        ],
        "id",
        vec![],
    ));
    profiler.add_table(table(
        "customers",
        vec![column("id", "integer"), column("name", "varchar")],
        "id",
        vec![],
    ));

    let orders = TableRef::new("public", "orders");
    let customers = TableRef::new("public", "customers");

    // 30 customers, 20 of them referenced
    profiler.set_column_values(
        &customers,
        "id",
        (1..=30).map(|i| i.to_string()).collect::<Vec<_>>(),
    );
    profiler.set_column_values(
        &customers,
        "name",
        (1..=30).map(|i| format!("customer {}", i)).collect::<Vec<_>>(),
    );

    let mut order_ids = Vec::new();
    let mut customer_refs = Vec::new();
    for i in 0..200usize {
        order_ids.push((i + 1).to_string());
        if i < orphans {
            // References nobody; a single bad value keeps the distinct
            // balance from tripping the direction check
            customer_refs.push("999".to_string());
        } else {
            customer_refs.push(((i % 20) + 1).to_string());
        }
    }
    profiler.set_column_values(&orders, "id", order_ids);
    profiler.set_column_values(&orders, "customer_id", customer_refs);
    profiler.set_column_values(
        &orders,
        "status",
        (0..200).map(|_| "open".to_string()).collect::<Vec<_>>(),
    );

    profiler
}

async fn run_discovery(profiler: InMemoryProfiler, store: Arc<OntologyStore>) {
    let profiler = Arc::new(profiler);
    let tables = profiler.get_all_tables().await.unwrap();
    let engine = DiscoveryEngine::new(
        profiler,
        Arc::clone(&store),
        DiscoveryConfig::default(),
    );
    engine.discover("p1", "ds1", &tables).await.unwrap();
}

#[tokio::test]
async fn test_clean_reference_accepted() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    run_discovery(make_profiler(0), Arc::clone(&store)).await;

    let candidates = store.list_candidates("ds1").unwrap();
    assert_eq!(candidates.len(), 1);

    let c = &candidates[0];
    assert_eq!(c.source.column, "customer_id");
    assert_eq!(c.target.table, "customers");
    assert_eq!(c.status, CandidateStatus::Accepted);
    assert_eq!(c.cardinality.to_string(), "N:1");
    assert_eq!(c.orphan_rate, Some(0.0));
    assert_eq!(c.matched_rows, Some(200));
    assert_eq!(c.orphan_rows, Some(0));
}

#[tokio::test]
async fn test_orphan_integrity_rejection() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    // 20/200 = 10% orphans, over the 5% integrity limit
    run_discovery(make_profiler(20), Arc::clone(&store)).await;

    let candidates = store.list_candidates("ds1").unwrap();
    assert_eq!(candidates.len(), 1);

    let c = &candidates[0];
    assert_eq!(c.status, CandidateStatus::Rejected);
    assert_eq!(c.rejection_reason, Some(RejectionReason::OrphanIntegrity));
    assert_eq!(c.rejection_reason.unwrap().as_str(), "orphan_integrity");
}

#[tokio::test]
async fn test_confidence_invariants() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());

    let profiler = make_profiler(0);
    let tables = {
        let p = Arc::new(profiler);
        let t = p.get_all_tables().await.unwrap();
        let engine =
            DiscoveryEngine::new(
                Arc::clone(&p) as Arc<dyn ontomap::profile::ProfilerProvider>,
                Arc::clone(&store),
                DiscoveryConfig::default(),
            );
        engine.import_foreign_keys("p1", "ds1", &t).await.unwrap();
        engine.discover("p1", "ds1", &t).await.unwrap();
        t
    };
    assert!(!tables.is_empty());

    for c in store.list_candidates("ds1").unwrap() {
        assert!((0.0..=1.0).contains(&c.confidence), "confidence {} out of range", c.confidence);
        if c.detection_method == DetectionMethod::ForeignKey {
            assert_eq!(c.confidence, 1.0);
        }
        assert!(matches!(
            c.cardinality.to_string().as_str(),
            "1:1" | "1:N" | "N:1" | "N:M" | "unknown"
        ));
    }
}

#[tokio::test]
async fn test_declared_fk_imported_verbatim() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());

    let mut profiler = make_profiler(0);
    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "payments".to_string(),
        columns: vec![column("id", "integer"), column("order_ref", "integer")],
        primary_key: Some(PrimaryKeyInfo {
            name: "pk_payments".to_string(),
            columns: vec!["id".to_string()],
        }),
        foreign_keys: vec![ForeignKeyInfo {
            name: "fk_payments_order".to_string(),
            columns: vec!["order_ref".to_string()],
            referenced_schema: "public".to_string(),
            referenced_table: "orders".to_string(),
            referenced_columns: vec!["id".to_string()],
        }],
    });

    let profiler = Arc::new(profiler);
    let tables = profiler.get_all_tables().await.unwrap();
    let engine =
        DiscoveryEngine::new(profiler, Arc::clone(&store), DiscoveryConfig::default());

    let imported = engine.import_foreign_keys("p1", "ds1", &tables).await.unwrap();
    assert_eq!(imported, 1);

    let candidates = store.list_candidates("ds1").unwrap();
    let fk = candidates
        .iter()
        .find(|c| c.detection_method == DetectionMethod::ForeignKey)
        .unwrap();
    assert_eq!(fk.confidence, 1.0);
    assert_eq!(fk.status, CandidateStatus::Accepted);
    assert!(!fk.is_required);
    assert!(!fk.needs_review());
}

#[tokio::test]
async fn test_user_decision_immune_to_rediscovery() {
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    run_discovery(make_profiler(0), Arc::clone(&store)).await;

    let candidate = store.list_candidates("ds1").unwrap().pop().unwrap();
    assert_eq!(candidate.status, CandidateStatus::Accepted);

    // A human overrides the auto-accept
    let decided = store
        .record_candidate_decision(&candidate.id, UserDecision::Rejected)
        .unwrap();
    assert_eq!(decided.status, CandidateStatus::Rejected);

    // Re-running discovery must not touch the decided candidate
    run_discovery(make_profiler(0), Arc::clone(&store)).await;

    let after = store.get_candidate(&candidate.id).unwrap();
    assert_eq!(after.status, CandidateStatus::Rejected);
    assert_eq!(after.user_decision, Some(UserDecision::Rejected));
}
