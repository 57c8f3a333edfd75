//! End-to-end scenarios across the component runner, pipeline runner, and
//! lineage recording.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::backends::{BoundInputs, NativeError};
use crate::engine::component::{ComponentCall, ComponentRunner, ComponentSpec};
use crate::errors::ComponentError;
use crate::graph::memory::{MemoryRecorder, UnreachableRecorder};
use crate::observability::MetricsRegistry;
use crate::serialize::Value;

fn record(fields: Vec<(&str, Value)>) -> Value {
    Value::record(
        "outputs",
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

fn add_runner(
    recorder: Arc<MemoryRecorder>,
    metrics: Arc<MetricsRegistry>,
) -> Arc<ComponentRunner> {
    let spec = ComponentSpec::builder("add")
        .parameter("a")
        .parameter("b")
        .source_listing("def add(a, b):\n    return {'sum': a + b}")
        .native(|inputs: &BoundInputs| {
            let sum = inputs.i64("a").unwrap_or(0) + inputs.i64("b").unwrap_or(0);
            Ok(record(vec![("sum", Value::Int(sum))]))
        })
        .build();
    Arc::new(
        ComponentRunner::builder(spec)
            .recorder(recorder)
            .metrics(metrics)
            .build()
            .unwrap(),
    )
}

fn mul_runner(
    recorder: Arc<MemoryRecorder>,
    metrics: Arc<MetricsRegistry>,
) -> Arc<ComponentRunner> {
    let spec = ComponentSpec::builder("mul")
        .parameter("a")
        .parameter("b")
        .native(|inputs: &BoundInputs| {
            let product = inputs.i64("a").unwrap_or(0) * inputs.i64("b").unwrap_or(0);
            Ok(record(vec![("product", Value::Int(product))]))
        })
        .build();
    Arc::new(
        ComponentRunner::builder(spec)
            .recorder(recorder)
            .metrics(metrics)
            .build()
            .unwrap(),
    )
}

// Simple chain: two invocations, one DEPENDS_ON edge between them.
#[tokio::test]
async fn chained_invocations_link_parent_to_child() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let add = add_runner(recorder.clone(), metrics.clone());
    let r1 = add
        .invoke(ComponentCall::new().arg(2i64).arg(3i64))
        .await
        .unwrap();
    assert_eq!(r1.output("sum"), Some(&Value::Int(5)));

    let mul = mul_runner(recorder.clone(), metrics.clone());
    let product = r1.output("sum").cloned().unwrap();
    let r2 = mul
        .invoke(
            ComponentCall::new()
                .arg(product)
                .arg(4i64)
                .parent(&r1.hash),
        )
        .await
        .unwrap();
    assert_eq!(r2.output("product"), Some(&Value::Int(20)));

    let components = recorder.vertices_with_label("Component");
    assert_eq!(components.len(), 2);
    let edges = recorder.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0], (r1.hash.clone(), r2.hash.clone(), "DEPENDS_ON".to_string()));

    // Recorded vertices carry the execution hash and success flag
    let parent = recorder.find_by_hash(&r1.hash).unwrap();
    assert_eq!(parent.attributes["Success"], true);
    assert_eq!(parent.attributes["Name"], "add");
}

// Retry until success: two transient failures, then a result. One vertex,
// three attempts on the meter.
#[tokio::test]
async fn flaky_component_retries_to_success() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let failures = Arc::new(AtomicU32::new(0));

    let counter = failures.clone();
    let spec = ComponentSpec::builder("flaky")
        .retries(true, 3)
        .native(move |_inputs: &BoundInputs| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(NativeError::transient("not yet"))
            } else {
                Ok(record(vec![("ok", Value::Bool(true))]))
            }
        })
        .build();
    let runner = ComponentRunner::builder(spec)
        .recorder(recorder.clone())
        .metrics(metrics.clone())
        .retry_delay(std::time::Duration::from_millis(1))
        .build()
        .unwrap();

    let result = runner.invoke(ComponentCall::new()).await.unwrap();
    assert_eq!(result.output("ok"), Some(&Value::Bool(true)));

    assert_eq!(metrics.attempt_count("flaky"), 3);
    let components = recorder.vertices_with_label("Component");
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].attributes["Success"], true);
}

// Fatal failure: invoked exactly once, vertex recorded with the error.
#[tokio::test]
async fn fatal_failure_records_one_failed_vertex() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let invocations = Arc::new(AtomicU32::new(0));

    let counter = invocations.clone();
    let spec = ComponentSpec::builder("broken")
        .retries(true, 3)
        .native(move |_inputs: &BoundInputs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(NativeError::fatal("invalid input shape"))
        })
        .build();
    let runner = ComponentRunner::builder(spec)
        .recorder(recorder.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let error = runner.invoke(ComponentCall::new()).await.unwrap_err();
    assert!(matches!(error, ComponentError::Execution { .. }));
    assert!(error.to_string().contains("invalid input shape"));

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.attempt_count("broken"), 1);

    let components = recorder.vertices_with_label("Component");
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].attributes["Success"], false);
    assert!(components[0].attributes.contains_key("Error"));
}

// Parallel fan-out/fan-in: five vertices, three edges in, three edges out.
#[tokio::test]
async fn fan_out_and_fan_in_record_full_lineage() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let split_spec = ComponentSpec::builder("split")
        .native(|_inputs: &BoundInputs| {
            Ok(record(vec![(
                "chunks",
                Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            )]))
        })
        .build();
    let split = ComponentRunner::builder(split_spec)
        .recorder(recorder.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    let split_result = split.invoke(ComponentCall::new()).await.unwrap();

    let reduce_spec = ComponentSpec::builder("reduce")
        .parameter("chunk")
        .native(|inputs: &BoundInputs| {
            Ok(record(vec![(
                "reduced",
                Value::Int(inputs.i64("chunk").unwrap_or(0) * 10),
            )]))
        })
        .build();
    let reduce = Arc::new(
        ComponentRunner::builder(reduce_spec)
            .recorder(recorder.clone())
            .metrics(metrics.clone())
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for chunk in 1..=3i64 {
        let reduce = reduce.clone();
        let parent = split_result.hash.clone();
        handles.push(tokio::spawn(async move {
            reduce
                .invoke(ComponentCall::new().kwarg("chunk", chunk).parent(&parent))
                .await
        }));
    }
    let mut reduce_hashes = Vec::new();
    for handle in handles {
        reduce_hashes.push(handle.await.unwrap().unwrap().hash);
    }

    let merge_spec = ComponentSpec::builder("merge")
        .native(|_inputs: &BoundInputs| Ok(record(vec![("merged", Value::Bool(true))])))
        .build();
    let merge = ComponentRunner::builder(merge_spec)
        .recorder(recorder.clone())
        .metrics(metrics)
        .build()
        .unwrap();
    let merge_result = merge
        .invoke(ComponentCall::new().parents(reduce_hashes.clone()))
        .await
        .unwrap();

    assert_eq!(recorder.vertices_with_label("Component").len(), 5);
    let edges = recorder.edges();
    assert_eq!(edges.len(), 6);
    for hash in &reduce_hashes {
        assert!(edges.contains(&(
            split_result.hash.clone(),
            hash.clone(),
            "DEPENDS_ON".to_string()
        )));
        assert!(edges.contains(&(
            hash.clone(),
            merge_result.hash.clone(),
            "DEPENDS_ON".to_string()
        )));
    }
}

// Lineage loss tolerance: unreachable endpoint, result still returned.
#[tokio::test]
async fn unreachable_graph_never_fails_the_computation() {
    let metrics = Arc::new(MetricsRegistry::new());
    let spec = ComponentSpec::builder("resilient")
        .native(|_inputs: &BoundInputs| Ok(record(vec![("value", Value::Int(7))])))
        .build();
    let runner = ComponentRunner::builder(spec)
        .recorder(Arc::new(UnreachableRecorder))
        .metrics(metrics.clone())
        .graph_retry(crate::config::RetrySettings {
            count: 2,
            delay: std::time::Duration::from_millis(1),
        })
        .build()
        .unwrap();

    let result = runner.invoke(ComponentCall::new()).await.unwrap();
    assert_eq!(result.output("value"), Some(&Value::Int(7)));
    assert_eq!(metrics.lineage_loss_count(), 1);
}

// Distinct calls with identical inputs get distinct execution ids; the
// timestamp participates in the hash.
#[tokio::test]
async fn repeated_calls_produce_distinct_hashes() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let add = add_runner(recorder, metrics);

    let first = add
        .invoke(ComponentCall::new().arg(1i64).arg(1i64))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = add
        .invoke(ComponentCall::new().arg(1i64).arg(1i64))
        .await
        .unwrap();

    assert_ne!(first.hash, second.hash);
}

// Parent ids without vertices are tolerated: the edge is skipped, the
// vertex still lands. Partial replay depends on this.
#[tokio::test]
async fn unknown_parent_skips_the_edge_but_records_the_vertex() {
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let add = add_runner(recorder.clone(), metrics);

    let result = add
        .invoke(
            ComponentCall::new()
                .arg(1i64)
                .arg(2i64)
                .parent("never-recorded-hash"),
        )
        .await
        .unwrap();

    assert_eq!(recorder.vertices_with_label("Component").len(), 1);
    assert!(recorder.edges().is_empty());
    assert_eq!(
        recorder.find_by_hash(&result.hash).unwrap().attributes["ParentHashes"][0],
        "never-recorded-hash"
    );
}
