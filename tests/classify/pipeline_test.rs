use std::sync::Arc;

use serde_json::json;

use ontomap::classify::{
    ClassificationPath, ClassificationPipeline, ClassifyConfig, ColumnFeatures,
    ColumnMetadataUpdate, EnumValueCategory, MetadataSource,
};
use ontomap::llm::StaticModelClient;
use ontomap::profile::{
    ColumnInfo, ColumnRef, InMemoryProfiler, PrimaryKeyInfo, TableMetadata, TableRef,
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

/// Orders fixture with the canonical status distribution: A:1000, P:50,
/// C:200, completed_at populated only for C rows.
fn make_profiler() -> InMemoryProfiler {
    let mut profiler = InMemoryProfiler::new();
    profiler.add_table(TableMetadata {
        schema: "public".to_string(),
        name: "orders".to_string(),
        columns: vec![
            column("id", "integer"),
            column("status", "varchar(1)"),
            column("completed_at", "timestamp"),
            column("total_amount", "bigint"),
            column("currency", "varchar(3)"),
        ],
        primary_key: Some(PrimaryKeyInfo {
            name: "pk_orders".to_string(),
            columns: vec!["id".to_string()],
        }),
        foreign_keys: vec![],
    });

    let orders = TableRef::new("public", "orders");
    let total = 1250usize;

    let mut ids = Vec::new();
    let mut status = Vec::new();
    let mut completed = Vec::new();
    let mut amounts = Vec::new();
    let mut currency = Vec::new();

    for i in 0..total {
        ids.push(Some((i + 1).to_string()));
        let s = if i < 1000 {
            "A"
        } else if i < 1050 {
            "P"
        } else {
            "C"
        };
        status.push(Some(s.to_string()));
        completed.push(if s == "C" {
            Some("2024-01-01T00:00:00Z".to_string())
        } else {
            None
        });
        amounts.push(Some(((i % 90) * 100 + 999).to_string()));
        currency.push(Some("USD".to_string()));
    }

    profiler.set_column(&orders, "id", ids);
    profiler.set_column(&orders, "status", status);
    profiler.set_column(&orders, "completed_at", completed);
    profiler.set_column(&orders, "total_amount", amounts);
    profiler.set_column(&orders, "currency", currency);
    profiler
}

fn make_model() -> StaticModelClient {
    let client = StaticModelClient::new();
    client.push_response(
        "classify_column",
        json!({
            "purpose": "column purpose",
            "semantic_type": "generic",
            "confidence": 0.8
        }),
    );
    client
}

async fn tables(profiler: &InMemoryProfiler) -> Vec<TableMetadata> {
    use ontomap::profile::ProfilerProviderExt;
    profiler.get_all_tables().await.unwrap()
}

#[tokio::test]
async fn test_end_to_end_enum_lifecycle() {
    let profiler = Arc::new(make_profiler());
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = Arc::new(make_model());
    let table_list = tables(&profiler).await;

    let pipeline = ClassificationPipeline::new(
        profiler,
        model,
        Arc::clone(&store),
        ClassifyConfig::default(),
    );

    let report = pipeline
        .run("p1", &table_list, &[], &mut |_| {})
        .await
        .unwrap();
    assert_eq!(report.columns_total, 5);
    assert_eq!(report.columns_stored, 5);
    assert!(report.failures.is_empty());

    let status = store
        .get_column_metadata("p1", &ColumnRef::new("public", "orders", "status"))
        .unwrap()
        .unwrap();
    assert_eq!(status.path, ClassificationPath::Enum);

    let Some(ColumnFeatures::Enum(feature)) = status.features else {
        panic!("status column should carry enum features");
    };
    assert_eq!(feature.completion_column.as_deref(), Some("completed_at"));

    // C completes ~100% of the time -> terminal; A and P never complete
    assert_eq!(
        feature.value("C").unwrap().category,
        Some(EnumValueCategory::Terminal)
    );
    assert!(matches!(
        feature.value("A").unwrap().category,
        Some(EnumValueCategory::Initial) | Some(EnumValueCategory::InProgress)
    ));
    assert!(matches!(
        feature.value("P").unwrap().category,
        Some(EnumValueCategory::Initial) | Some(EnumValueCategory::InProgress)
    ));
}

#[tokio::test]
async fn test_monetary_column_paired_with_currency() {
    let profiler = Arc::new(make_profiler());
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = Arc::new(make_model());
    let table_list = tables(&profiler).await;

    let pipeline = ClassificationPipeline::new(
        profiler,
        model,
        Arc::clone(&store),
        ClassifyConfig::default(),
    );
    pipeline
        .run("p1", &table_list, &[], &mut |_| {})
        .await
        .unwrap();

    let amount = store
        .get_column_metadata("p1", &ColumnRef::new("public", "orders", "total_amount"))
        .unwrap()
        .unwrap();

    let Some(ColumnFeatures::Monetary(feature)) = amount.features else {
        panic!("total_amount should carry monetary features");
    };
    assert_eq!(feature.currency_column.as_deref(), Some("currency"));
}

#[tokio::test]
async fn test_progress_totals_exact_after_collect() {
    let profiler = Arc::new(make_profiler());
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = Arc::new(make_model());
    let table_list = tables(&profiler).await;

    let pipeline = ClassificationPipeline::new(
        profiler,
        model,
        Arc::clone(&store),
        ClassifyConfig::default(),
    );

    let mut events: Vec<(String, usize, usize)> = Vec::new();
    pipeline
        .run("p1", &table_list, &[], &mut |p| {
            events.push((p.phase.as_str().to_string(), p.current, p.total));
        })
        .await
        .unwrap();

    // Collect reports all five columns before anything else
    let collect: Vec<_> = events.iter().filter(|e| e.0 == "collect").collect();
    assert_eq!(collect.len(), 5);
    assert!(collect.iter().all(|e| e.2 == 5));
    assert_eq!(collect.last().unwrap().1, 5);

    // Totals within each later phase are constant (known up front)
    for phase in ["classify", "enum_analysis", "store"] {
        let totals: Vec<usize> = events.iter().filter(|e| e.0 == phase).map(|e| e.2).collect();
        assert!(
            totals.windows(2).all(|w| w[0] == w[1]),
            "{} totals drifted: {:?}",
            phase,
            totals
        );
    }
}

#[tokio::test]
async fn test_inference_rerun_preserves_manual_fields() {
    let profiler = Arc::new(make_profiler());
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let model = Arc::new(make_model());
    let table_list = tables(&profiler).await;

    let status = ColumnRef::new("public", "orders", "status");

    // A manual edit lands before the pipeline ever runs
    store
        .merge_column_metadata(
            "p1",
            &status,
            ColumnMetadataUpdate {
                purpose: Some("curated by hand".to_string()),
                ..Default::default()
            },
            MetadataSource::Manual,
        )
        .unwrap();

    let pipeline = ClassificationPipeline::new(
        profiler,
        model,
        Arc::clone(&store),
        ClassifyConfig::default(),
    );
    pipeline
        .run("p1", &table_list, &[], &mut |_| {})
        .await
        .unwrap();

    let metadata = store.get_column_metadata("p1", &status).unwrap().unwrap();
    // Manual purpose survives the inference run; inference filled the rest
    assert_eq!(metadata.purpose.as_deref(), Some("curated by hand"));
    assert_eq!(metadata.path, ClassificationPath::Enum);
    assert_eq!(
        metadata.field_sources.get("purpose"),
        Some(&MetadataSource::Manual)
    );
    assert_eq!(
        metadata.field_sources.get("path"),
        Some(&MetadataSource::Inference)
    );
}

#[tokio::test]
async fn test_malformed_model_output_is_item_failure() {
    let profiler = Arc::new(make_profiler());
    let store = Arc::new(OntologyStore::open_in_memory().unwrap());
    let table_list = tables(&profiler).await;

    // Arrays cannot be coerced into a classification object
    let model = StaticModelClient::new();
    model.push_response("classify_column", json!([1, 2, 3]));

    let pipeline = ClassificationPipeline::new(
        profiler,
        Arc::new(model),
        Arc::clone(&store),
        ClassifyConfig::default(),
    );

    let report = pipeline
        .run("p1", &table_list, &[], &mut |_| {})
        .await
        .unwrap();

    // The run survives; affected columns are recorded, others still stored
    assert!(!report.failures.is_empty());
    assert_eq!(report.columns_stored, 5);
    assert!(report.failures.iter().all(|f| f.phase == "classify"));
}
