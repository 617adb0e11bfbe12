//! Integration tests for the logging, timing and performance middleware

use modulink::chain::{chain, Link};
use modulink::context::Context;
use modulink::middleware::{
    logging, performance_tracker, timed, timing, LogLevel, LoggingOptions, PerformanceOptions,
};
use serde_json::json;
use std::time::Duration;

fn add(name: &str, amount: i64) -> Link {
    Link::sync(name, move |mut ctx| {
        let value = ctx.get_i64("value").unwrap_or(0);
        ctx.set("value", value + amount);
        Ok(ctx)
    })
}

#[tokio::test]
async fn test_performance_tracker_counts_across_invocations() {
    let pipeline = chain([add("one", 1)]).unwrap();
    pipeline.use_global([performance_tracker(PerformanceOptions {
        expose_metrics: true,
        ..Default::default()
    })]);

    let first = pipeline.execute(Context::new()).await;
    assert_eq!(first.performance_metrics.unwrap().total_executions, 1);

    let second = pipeline.execute(Context::new()).await;
    let metrics = second.performance_metrics.unwrap();
    assert_eq!(metrics.total_executions, 2);

    let metadata = second.metadata.unwrap();
    assert_eq!(metrics.chain_id, metadata.chain_id);
    assert!(metadata.start_time.is_some());
}

#[tokio::test]
async fn test_performance_tracker_chain_id_stable_per_tracker() {
    let pipeline = chain([add("one", 1)]).unwrap();
    pipeline.use_on_input([performance_tracker(PerformanceOptions::default())]);

    let a = pipeline.execute(Context::new()).await.metadata.unwrap().chain_id;
    let b = pipeline.execute(Context::new()).await.metadata.unwrap().chain_id;
    assert!(a.as_deref().unwrap().starts_with("chain_"));
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_minimal_performance_tracking() {
    let pipeline = chain([add("one", 1)]).unwrap();
    pipeline.use_on_input([performance_tracker(PerformanceOptions::minimal())]);

    let result = pipeline.execute(Context::new()).await;
    let value = result.to_value();
    assert_eq!(value["_metadata"], json!({"minimal": true}));
    assert_eq!(value["value"], 1);
}

#[tokio::test]
async fn test_timing_middleware_writes_once_per_execution() {
    let pipeline = chain([add("one", 1), add("two", 2), add("three", 3)]).unwrap();
    pipeline.use_global([timing("total")]);

    let result = pipeline.execute(Context::new()).await;

    let timings = result.timings.as_ref().unwrap();
    assert_eq!(timings.len(), 1);
    assert!(timings["total"].duration >= 0.0);
    assert!(timings["total"].timestamp > 0);
    assert_eq!(result.get("processed"), Some(&json!(true)));
    assert_eq!(result.get_i64("value"), Some(6));
}

#[tokio::test]
async fn test_timed_link_attaches_timing_to_error() {
    let slow_failure = Link::new("slowFailure", |_ctx| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err::<Context, _>(anyhow::anyhow!("downstream unavailable"))
    });
    let pipeline = chain([timed("fetch", add("one", 1)), timed("call", slow_failure)]).unwrap();

    let result = pipeline.execute(Context::new()).await;

    assert!(result.timings.as_ref().unwrap().contains_key("fetch"));
    let error = result.error.unwrap();
    assert_eq!(error.message, "downstream unavailable");
    let timing = &error.timings.unwrap()["call"];
    assert!(timing.duration >= 5.0);
}

#[tokio::test]
async fn test_logging_records_link_names_and_metadata() {
    let pipeline = chain([add("loadUser", 1), add("saveUser", 2)]).unwrap();
    pipeline.use_on_input([logging(LoggingOptions {
        level: LogLevel::Debug,
        ..Default::default()
    })]);

    let result = pipeline.execute(Context::new()).await;

    let value = result.to_value();
    assert_eq!(value["_observedBy"]["enhancedLogging"], true);
    let metrics = result.logging_metrics.as_ref().unwrap();
    assert_eq!(metrics.execution_count, 2);
    assert_eq!(metrics.last_link.as_deref(), Some("saveUser"));

    let metadata = result.metadata.as_ref().unwrap();
    assert_eq!(metadata.link_count, Some(2));
    assert!(metadata.chain_id.is_some());
    assert!(metadata.total_duration.is_some());
}

#[tokio::test]
async fn test_logging_without_name_detection() {
    let pipeline = chain([add("hidden", 1)]).unwrap();
    pipeline.use_on_output([logging(LoggingOptions {
        detect_function_names: false,
        track_performance: true,
        ..Default::default()
    })]);

    let result = pipeline.execute(Context::new()).await;
    let metrics = result.logging_metrics.unwrap();
    assert_eq!(metrics.last_link.as_deref(), Some("unknown"));
    assert_eq!(metrics.performance.len(), 1);
}

#[tokio::test]
async fn test_observability_leaves_business_fields_alone() {
    let plain = chain([add("one", 1), add("two", 2)]).unwrap();
    let observed = chain([add("one", 1), add("two", 2)]).unwrap();
    observed
        .use_on_input([
            logging(LoggingOptions::default()),
            performance_tracker(PerformanceOptions {
                expose_metrics: true,
                track_memory: true,
                ..Default::default()
            }),
        ])
        .use_on_output([logging(LoggingOptions::default())]);

    let input = Context::new().with("value", 10).with("name", "ada");
    let expected = plain.execute(input.clone()).await;
    let actual = observed.execute(input).await;

    assert_eq!(expected.fields, actual.fields);
    assert!(!actual.has_error());
}
