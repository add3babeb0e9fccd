use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use karpix_job_queue::{
    async_trait, handler_fn, HandlerCall, HandlerError, HandlerRegistry, HandlerResponse,
    JobData, JobDescriptor, ResolutionError,
};
use karpix_status_log::{
    FileStatusLogger, JobStatus, MemoryStatusLogger, StatusLogError, StatusLogger, StatusRecord,
};
use karpix_webhook::RecordingNotifier;
use karpix_worker::{ExecutionContext, ResponseEnvelope, TaskRunner};
use serde_json::{json, Value};

const MODULE: &str = "services.media";

async fn registry() -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    registry
        .register(handler_fn(MODULE, "ok", |_call: HandlerCall| async {
            Ok::<_, HandlerError>(HandlerResponse::new("ok", "/run", 200))
        }))
        .await;
    registry
        .register(handler_fn(MODULE, "bad", |_call: HandlerCall| async {
            Err::<HandlerResponse, _>(HandlerError::failed("bad input"))
        }))
        .await;
    registry
        .register(handler_fn(MODULE, "denied", |_call: HandlerCall| async {
            Ok::<_, HandlerError>(HandlerResponse::new("denied", "/run", 403))
        }))
        .await;
    registry
        .register(handler_fn(MODULE, "inputs", |call: HandlerCall| async move {
            Ok::<_, HandlerError>(HandlerResponse::ok(
                json!({
                    "job_id": call.job_id,
                    "media_url": call.data.extra.get("media_url").cloned(),
                    "first": call.args.first().cloned(),
                    "fps": call.kwargs.get("fps").cloned(),
                }),
                "/inputs",
            ))
        }))
        .await;
    registry
        .register(handler_fn(MODULE, "slow", |_call: HandlerCall| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, HandlerError>(HandlerResponse::ok("slept", "/slow"))
        }))
        .await;
    registry
        .register(handler_fn(MODULE, "panics", |_call: HandlerCall| async {
            if true {
                panic!("handler blew up");
            }
            Ok::<_, HandlerError>(HandlerResponse::ok("unreachable", "/panics"))
        }))
        .await;
    registry
}

struct Harness {
    runner: TaskRunner,
    log: MemoryStatusLogger,
    notifier: RecordingNotifier,
}

async fn harness_with(notifier: RecordingNotifier) -> Harness {
    let log = MemoryStatusLogger::new();
    let runner = TaskRunner::new(
        registry().await,
        Arc::new(log.clone()),
        Arc::new(notifier.clone()),
        "build-42",
    );
    Harness {
        runner,
        log,
        notifier,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingNotifier::new()).await
}

fn job(qualname: &str, data: JobData) -> JobDescriptor {
    JobDescriptor::new(MODULE, qualname, "J1", data)
}

fn statuses(records: &[StatusRecord]) -> Vec<JobStatus> {
    records.iter().map(|r| r.job_status).collect()
}

#[tokio::test]
async fn success_is_recorded_as_done() {
    let h = harness().await;
    let envelope = h
        .runner
        .run(&job("ok", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap();

    assert_eq!(envelope.response, json!("ok"));
    assert_eq!(envelope.message, json!("success"));
    assert_eq!(envelope.code, 200);
    assert_eq!(envelope.endpoint, "/run");
    assert_eq!(envelope.id, json!("X1"));
    assert_eq!(envelope.job_id, "J1");
    assert_eq!(envelope.queue_id, "rq");
    assert_eq!(envelope.pid, std::process::id());
    assert_eq!(envelope.build_number, "build-42");
    assert_eq!(envelope.queue_length, 0);

    let records = h.log.records_for("J1").await;
    assert_eq!(statuses(&records), [JobStatus::Running, JobStatus::Done]);
    assert_eq!(records[0].response, None);
    assert_eq!(records[0].queue_id, "rq");
    let done = records[1].response.clone().unwrap();
    assert_eq!(done, serde_json::to_value(&envelope).unwrap());
}

#[tokio::test]
async fn handler_error_is_recorded_then_returned() {
    let h = harness().await;
    let err = h
        .runner
        .run(&job("bad", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap_err();

    assert!(matches!(&err, HandlerError::Failed(m) if m == "bad input"));

    let records = h.log.records_for("J1").await;
    assert_eq!(statuses(&records), [JobStatus::Running, JobStatus::Failed]);
    let failed = records[1].response.clone().unwrap();
    assert_eq!(failed["code"], 500);
    assert_eq!(failed["message"], "bad input");
    assert_eq!(failed["id"], "X1");
    assert_eq!(failed["job_id"], "J1");
    assert_eq!(failed["queue_id"], "rq");
    assert_eq!(failed["build_number"], "build-42");
    assert!(failed.get("run_time").is_none());
}

#[tokio::test]
async fn non_200_moves_payload_to_message() {
    let h = harness().await;
    let envelope = h
        .runner
        .run(&job("denied", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap();

    assert_eq!(envelope.response, Value::Null);
    assert_eq!(envelope.message, json!("denied"));
    assert_eq!(envelope.code, 403);
    assert_eq!(statuses(&h.log.records_for("J1").await), [JobStatus::Running, JobStatus::Done]);
}

#[tokio::test]
async fn missing_id_is_echoed_as_null() {
    let h = harness().await;
    let envelope = h
        .runner
        .run(&job("ok", JobData::default()), &ExecutionContext::detached())
        .await
        .unwrap();
    assert_eq!(envelope.id, Value::Null);
}

#[tokio::test]
async fn no_webhook_without_url() {
    let h = harness().await;
    h.runner
        .run(&job("ok", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap();
    h.runner
        .run(
            &job("bad", JobData::with_id("X1").webhook("   ")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap_err();
    assert!(h.notifier.calls().await.is_empty());
}

#[tokio::test]
async fn webhook_receives_final_envelope_once() {
    let h = harness().await;
    let envelope = h
        .runner
        .run(
            &job("ok", JobData::with_id("X1").webhook("https://x")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap();

    let calls = h.notifier.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "https://x");
    assert_eq!(calls[0].1, serde_json::to_value(&envelope).unwrap());
}

#[tokio::test]
async fn webhook_receives_failure_envelope() {
    let h = harness().await;
    h.runner
        .run(
            &job("bad", JobData::with_id("X1").webhook("https://x")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap_err();

    let calls = h.notifier.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["code"], 500);
    assert_eq!(calls[0].1["message"], "bad input");
}

#[tokio::test]
async fn webhook_failure_does_not_change_outcome() {
    let h = harness_with(RecordingNotifier::failing(502)).await;
    let envelope = h
        .runner
        .run(
            &job("ok", JobData::with_id("X1").webhook("https://x")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap();
    assert_eq!(envelope.code, 200);
    assert_eq!(h.notifier.calls().await.len(), 1);
    assert_eq!(statuses(&h.log.records_for("J1").await), [JobStatus::Running, JobStatus::Done]);

    let err = h
        .runner
        .run(
            &JobDescriptor::new(MODULE, "bad", "J2", JobData::default().webhook("https://x")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "bad input");
}

#[tokio::test]
async fn handler_receives_job_inputs() {
    let h = harness().await;
    let descriptor = job("inputs", JobData::with_id(7).field("media_url", "https://cdn.test/a.mp4"))
        .with_args(vec![json!("first")])
        .with_kwarg("fps", 30);
    let envelope = h
        .runner
        .run(&descriptor, &ExecutionContext::detached())
        .await
        .unwrap();

    assert_eq!(
        envelope.response,
        json!({
            "job_id": "J1",
            "media_url": "https://cdn.test/a.mp4",
            "first": "first",
            "fps": 30,
        })
    );
    assert_eq!(envelope.id, json!(7));
}

#[tokio::test]
async fn unknown_module_is_a_resolution_failure() {
    let h = harness().await;
    let descriptor = JobDescriptor::new("services.nothing", "run", "J1", JobData::with_id("X1"));
    let err = h
        .runner
        .run(&descriptor, &ExecutionContext::detached())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HandlerError::Resolution(ResolutionError::ModuleNotFound(ref m)) if m == "services.nothing"
    ));
    let records = h.log.records_for("J1").await;
    assert_eq!(statuses(&records), [JobStatus::Running, JobStatus::Failed]);
    assert_eq!(
        records[1].response.as_ref().unwrap()["message"],
        "No module named 'services.nothing'"
    );
}

#[tokio::test]
async fn unknown_attribute_is_a_resolution_failure() {
    let h = harness().await;
    let err = h
        .runner
        .run(&job("missing", JobData::default()), &ExecutionContext::detached())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HandlerError::Resolution(ResolutionError::AttributeNotFound { .. })
    ));
}

#[tokio::test]
async fn reserved_kwargs_are_rejected() {
    let h = harness().await;
    for reserved in ["job_id", "data"] {
        let descriptor = job("ok", JobData::default()).with_kwarg(reserved, "clash");
        let err = h
            .runner
            .run(&descriptor, &ExecutionContext::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::ArgumentCollision(ref k) if k == reserved));
    }

    let records = h.log.records_for("J1").await;
    assert_eq!(
        statuses(&records),
        [JobStatus::Running, JobStatus::Failed, JobStatus::Running, JobStatus::Failed]
    );
}

#[tokio::test]
async fn panicking_handler_is_reported_as_failure() {
    let h = harness().await;
    let err = h
        .runner
        .run(&job("panics", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::Panicked(ref m) if m == "handler blew up"));
    let records = h.log.records_for("J1").await;
    assert_eq!(statuses(&records), [JobStatus::Running, JobStatus::Failed]);
}

#[tokio::test]
async fn timings_are_reported() {
    let h = harness().await;
    let started = Utc::now();
    let ctx = ExecutionContext::detached()
        .with_started_at(started)
        .with_enqueued_at(Some(started - chrono::Duration::seconds(2)));

    let envelope = h.runner.run(&job("slow", JobData::default()), &ctx).await.unwrap();
    assert_eq!(envelope.queue_time, 2.0);
    assert!(envelope.run_time >= 0.02);
    assert!(envelope.total_time >= envelope.queue_time + envelope.run_time - 0.002);
}

#[tokio::test]
async fn queue_time_never_negative() {
    let h = harness().await;
    let started = Utc::now();
    let skewed = ExecutionContext::detached()
        .with_started_at(started)
        .with_enqueued_at(Some(started + chrono::Duration::seconds(30)));
    let envelope = h.runner.run(&job("ok", JobData::default()), &skewed).await.unwrap();
    assert_eq!(envelope.queue_time, 0.0);
    assert_eq!(envelope.total_time, 0.0);

    let detached = h
        .runner
        .run(&job("ok", JobData::default()), &ExecutionContext::detached())
        .await
        .unwrap();
    assert_eq!(detached.queue_time, 0.0);
}

struct BrokenLog;

#[async_trait]
impl StatusLogger for BrokenLog {
    async fn record(&self, job_id: &str, _record: &StatusRecord) -> Result<(), StatusLogError> {
        Err(StatusLogError::InvalidJobId(job_id.to_owned()))
    }
}

#[tokio::test]
async fn status_log_failures_are_contained() {
    let notifier = RecordingNotifier::new();
    let runner = TaskRunner::new(
        registry().await,
        Arc::new(BrokenLog),
        Arc::new(notifier.clone()),
        "build-42",
    );

    let envelope = runner
        .run(
            &job("ok", JobData::with_id("X1").webhook("https://x")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap();
    assert_eq!(envelope.code, 200);
    assert_eq!(notifier.calls().await.len(), 1);

    let err = runner
        .run(&job("bad", JobData::default()), &ExecutionContext::detached())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "bad input");
}

#[tokio::test]
async fn file_log_keeps_terminal_record() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileStatusLogger::new(dir.path());
    let runner = TaskRunner::new(
        registry().await,
        Arc::new(log.clone()),
        Arc::new(RecordingNotifier::new()),
        "build-42",
    );

    runner
        .run(&job("denied", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap();

    let stored = log.read("J1").await.unwrap().unwrap();
    assert_eq!(stored.job_status, JobStatus::Done);
    let response = stored.response.unwrap();
    assert_eq!(response["message"], "denied");
    assert_eq!(response["response"], Value::Null);
}

#[tokio::test]
async fn recorded_envelopes_parse_back() {
    let h = harness().await;
    h.runner
        .run(&job("ok", JobData::with_id("X1")), &ExecutionContext::detached())
        .await
        .unwrap();
    h.runner
        .run(
            &JobDescriptor::new(MODULE, "bad", "J2", JobData::with_id("X2")),
            &ExecutionContext::detached(),
        )
        .await
        .unwrap_err();

    let done = h.log.records_for("J1").await[1].response.clone().unwrap();
    let done: ResponseEnvelope = serde_json::from_value(done).unwrap();
    assert!(matches!(done, ResponseEnvelope::Completed(_)));
    assert_eq!(done.code(), 200);

    let failed = h.log.records_for("J2").await[1].response.clone().unwrap();
    let failed: ResponseEnvelope = serde_json::from_value(failed).unwrap();
    assert!(matches!(failed, ResponseEnvelope::Failed(_)));
    assert_eq!(failed.code(), 500);
    assert_eq!(failed.job_id(), "J2");
}
