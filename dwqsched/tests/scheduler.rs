use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio_stream::StreamExt;

use dwqcore::{
    constraint::{Constraints, NetworkRequirement, NetworkState},
    input::{Data, Value},
    platform::PlatformConnector,
    work::{
        traits::WorkBackend,
        InputMerger,
        UniquePolicy,
        WorkFilter,
        WorkRequest,
        WorkState,
    },
};
use dwqdb_sqlite::SqliteBackend;
use dwqsched::{
    config::SchedulerConfig,
    handle::WorkHandle,
    registry::{WorkOutcome, Worker, WorkerRegistry},
    service::{Builder, Scheduler},
};
use test_dwq::wait_for;

const DEADLINE: Duration = Duration::from_secs(5);

/// Succeeds immediately; outputs `{x: input[emit]}` when the input
/// carries an `emit` value, empty output otherwise.
struct EmitWorker;

#[async_trait]
impl Worker for EmitWorker {
    async fn run(&mut self, input: Data, _handle: WorkHandle) -> WorkOutcome {
        match input.get("emit") {
            Some(Value::I64(v)) => {
                WorkOutcome::Success(Data::new().with("x", *v))
            }
            _ => WorkOutcome::success(),
        }
    }
}

/// Returns Retry until the shared counter reaches the threshold.
struct FlakyWorker {
    counter: Arc<AtomicUsize>,
    succeed_at: usize,
}

#[async_trait]
impl Worker for FlakyWorker {
    async fn run(&mut self, _input: Data, _handle: WorkHandle) -> WorkOutcome {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if n + 1 < self.succeed_at {
            WorkOutcome::Retry
        } else {
            WorkOutcome::success()
        }
    }
}

/// Runs until cancelled, observing the handle cooperatively.
struct BlockingWorker;

#[async_trait]
impl Worker for BlockingWorker {
    async fn run(&mut self, _input: Data, handle: WorkHandle) -> WorkOutcome {
        handle.cancelled().await;
        WorkOutcome::failure()
    }
}

/// Publishes progress before succeeding.
struct ProgressWorker;

#[async_trait]
impl Worker for ProgressWorker {
    async fn run(&mut self, _input: Data, handle: WorkHandle) -> WorkOutcome {
        handle.publish_progress(Data::new().with("pct", 50i64));
        tokio::time::sleep(Duration::from_millis(50)).await;
        WorkOutcome::success()
    }
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        // scaled down so retries and periods fit in test time
        min_backoff_ms: 10,
        minimum_period_ms: 50,
        quiescence_deadline: Duration::from_secs(1),
        .. Default::default()
    }
}

fn base_registry() -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    registry.register("emit", || Box::new(EmitWorker) as Box<dyn Worker>);
    registry.register("block", || Box::new(BlockingWorker) as Box<dyn Worker>);
    registry.register("progress", || Box::new(ProgressWorker) as Box<dyn Worker>);
    registry
}

async fn sqlite_platform(dir: &TempDir) -> anyhow::Result<SqliteBackend> {
    let url = format!("sqlite:{}/dwq.db", dir.path().display());
    SqliteBackend::ws(url.into())
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

async fn started_scheduler(
    dir: &TempDir,
    registry: WorkerRegistry,
) -> anyhow::Result<Scheduler<SqliteBackend>> {
    let platform = sqlite_platform(dir).await?;
    let mut scheduler = Builder::new()
        .platform(platform)
        .registry(registry)
        .config(test_config())
        .build();
    scheduler.startup().await;
    Ok(scheduler)
}

async fn wait_for_state(
    scheduler: &Scheduler<SqliteBackend>,
    id: i64,
    state: WorkState,
) -> Option<dwqcore::work::WorkSnapshot> {
    wait_for(DEADLINE, || async {
        scheduler.get_info_by_id(id)
            .await
            .ok()
            .flatten()
            .filter(|snapshot| snapshot.state == state)
    }).await
}

#[tokio::test]
async fn plain_one_shot_runs_to_success() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let id = scheduler.enqueue(WorkRequest::one_shot("emit")).await?;
    let snapshot = wait_for_state(&scheduler, id, WorkState::Succeeded)
        .await
        .expect("work succeeded");
    assert_eq!(snapshot.attempt, 1);
    assert_eq!(snapshot.run_count, 1);
    assert_eq!(snapshot.output, Some(Data::default()));
    Ok(())
}

#[tokio::test]
async fn constrained_work_waits_for_network() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut scheduler = started_scheduler(&dir, base_registry()).await?;
    let mut signals = scheduler.signal_source().expect("source available");

    let id = scheduler.enqueue(WorkRequest {
        constraints: Constraints {
            network: NetworkRequirement::Connected,
            .. Default::default()
        },
        .. WorkRequest::one_shot("emit")
    }).await?;

    // no network yet; the record must hold in ENQUEUED
    tokio::time::sleep(Duration::from_millis(300)).await;
    let held = scheduler.get_info_by_id(id).await?.expect("present");
    assert_eq!(held.state, WorkState::Enqueued);

    signals.set_network(NetworkState::Metered);
    let snapshot = wait_for_state(&scheduler, id, WorkState::Succeeded)
        .await
        .expect("work ran once the network came up");
    assert_eq!(snapshot.output, Some(Data::default()));
    Ok(())
}

#[tokio::test]
async fn chain_collects_prerequisite_outputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let a = scheduler.enqueue(WorkRequest {
        input: Data::new().with("emit", 1i64),
        .. WorkRequest::one_shot("emit")
    }).await?;
    let b = scheduler.enqueue(WorkRequest {
        input: Data::new().with("emit", 2i64),
        prereqs: vec![a],
        .. WorkRequest::one_shot("emit")
    }).await?;
    let c = scheduler.enqueue(WorkRequest {
        prereqs: vec![a, b],
        input_merger: InputMerger::ArrayCollecting,
        .. WorkRequest::one_shot("emit")
    }).await?;

    wait_for_state(&scheduler, c, WorkState::Succeeded)
        .await
        .expect("chain completed");

    // activation merged the prerequisite outputs in enumeration order
    let record = scheduler.platform().get_work(c).await?.expect("present");
    assert_eq!(
        record.input.get("x"),
        Some(&Value::I64Array(vec![1, 2])),
    );
    Ok(())
}

#[tokio::test]
async fn failed_prerequisite_cascades_cancellation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    // nothing registered under this key: the head fails terminally
    let head = scheduler.enqueue(WorkRequest::one_shot("ghost")).await?;
    let dependent = scheduler.enqueue(WorkRequest {
        prereqs: vec![head],
        .. WorkRequest::one_shot("emit")
    }).await?;

    let failed = wait_for_state(&scheduler, head, WorkState::Failed)
        .await
        .expect("unknown class key fails the record");
    let output = failed.output.expect("error output recorded");
    assert!(matches!(output.get("error"), Some(Value::Str(_))));

    let cancelled = wait_for_state(&scheduler, dependent, WorkState::Cancelled)
        .await
        .expect("dependent cascaded");
    assert_eq!(cancelled.output, None);
    Ok(())
}

#[tokio::test]
async fn retry_sequence_ends_in_success() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = Arc::new(AtomicUsize::new(0));
    let mut registry = base_registry();
    let shared = Arc::clone(&counter);
    registry.register("flaky", move || Box::new(FlakyWorker {
        counter: Arc::clone(&shared),
        succeed_at: 4,
    }) as Box<dyn Worker>);
    let scheduler = started_scheduler(&dir, registry).await?;

    let id = scheduler.enqueue(WorkRequest {
        backoff_policy: dwqcore::work::BackoffPolicy::Linear,
        backoff_base_ms: 50,
        .. WorkRequest::one_shot("flaky")
    }).await?;

    let snapshot = wait_for_state(&scheduler, id, WorkState::Succeeded)
        .await
        .expect("retries exhausted into success");
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(snapshot.attempt, 4);
    assert_eq!(snapshot.run_count, 1);
    Ok(())
}

#[tokio::test]
async fn unique_replace_while_running() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let old = scheduler.enqueue_unique(
        "job",
        UniquePolicy::Replace,
        WorkRequest::one_shot("block"),
    ).await?;
    wait_for_state(&scheduler, old, WorkState::Running)
        .await
        .expect("blocking work started");

    let new = scheduler.enqueue_unique(
        "job",
        UniquePolicy::Replace,
        WorkRequest::one_shot("emit"),
    ).await?;
    assert_ne!(old, new);

    wait_for_state(&scheduler, old, WorkState::Cancelled)
        .await
        .expect("old work cancelled within the quiescence deadline");
    wait_for_state(&scheduler, new, WorkState::Succeeded)
        .await
        .expect("replacement ran");

    let live: Vec<_> = scheduler.get_infos_by_unique_name("job")
        .await?
        .into_iter()
        .filter(|snapshot| !matches!(
            snapshot.state,
            WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled,
        ))
        .collect();
    assert!(live.is_empty());
    Ok(())
}

#[tokio::test]
async fn unique_keep_returns_existing_id() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let first = scheduler.enqueue_unique(
        "job",
        UniquePolicy::Keep,
        WorkRequest::one_shot("block"),
    ).await?;
    let second = scheduler.enqueue_unique(
        "job",
        UniquePolicy::Keep,
        WorkRequest::one_shot("emit"),
    ).await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn crash_recovery_redispatches_with_incremented_attempt() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    // simulate a process that died mid-run: claimed but never finished
    let platform = sqlite_platform(&dir).await?;
    let work = match platform.insert_work(dwqcore::work::NewWork {
        request: WorkRequest::one_shot("emit"),
        unique_name: None,
        policy: None,
    }).await? {
        dwqcore::work::IngestOutcome::Created { work, .. } => work,
        other => anyhow::bail!("unexpected outcome: {other:?}"),
    };
    platform.claim_work(work.id).await?.expect("claimable");
    drop(platform);

    let scheduler = started_scheduler(&dir, base_registry()).await?;
    let snapshot = wait_for_state(&scheduler, work.id, WorkState::Succeeded)
        .await
        .expect("recovered work re-dispatched");
    // one increment from the interrupted claim, one from the re-run
    assert_eq!(snapshot.attempt, 2);
    Ok(())
}

#[tokio::test]
async fn periodic_work_repeats_and_resets_attempt() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let id = scheduler.enqueue(
        WorkRequest::periodic("emit", 400, 100),
    ).await?;

    let snapshot = wait_for(Duration::from_secs(10), || async {
        scheduler.get_info_by_id(id)
            .await
            .ok()
            .flatten()
            .filter(|snapshot| snapshot.run_count >= 2)
    }).await.expect("two period completions");

    // periodic completion re-enqueues with a fresh attempt counter
    assert_eq!(snapshot.attempt, 0);
    assert!(!snapshot.state.is_terminal());

    let record = scheduler.platform().get_work(id).await?.expect("present");
    let anchor = record.period_anchor_ts.expect("anchored");
    // the next window opens at anchor + period - flex
    assert_eq!(record.next_run_ts, anchor + 300);
    Ok(())
}

#[tokio::test]
async fn observe_streams_progress_and_states() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let id = scheduler.enqueue(WorkRequest {
        initial_delay_ms: 100,
        .. WorkRequest::one_shot("progress")
    }).await?;
    let mut stream = scheduler.observe(WorkFilter::by_id(id)).await?;

    let mut states = Vec::new();
    let mut saw_progress = false;
    while let Some(snapshot) = tokio::time::timeout(DEADLINE, stream.next())
        .await
        .expect("stream stayed live")
    {
        states.push(snapshot.state);
        if let Some(progress) = snapshot.progress.as_ref() {
            saw_progress |= progress.get("pct") == Some(&Value::I64(50));
        }
        if snapshot.state == WorkState::Succeeded {
            break;
        }
    }

    assert_eq!(states.first(), Some(&WorkState::Enqueued));
    assert!(states.contains(&WorkState::Running));
    assert_eq!(states.last(), Some(&WorkState::Succeeded));
    assert!(saw_progress, "progress snapshot was delivered");
    Ok(())
}

#[tokio::test]
async fn cancel_by_tag_takes_down_running_chain() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scheduler = started_scheduler(&dir, base_registry()).await?;

    let head = scheduler.enqueue(WorkRequest {
        tags: vec!["batch".into()],
        .. WorkRequest::one_shot("block")
    }).await?;
    let dependent = scheduler.enqueue(WorkRequest {
        tags: vec!["batch".into()],
        prereqs: vec![head],
        .. WorkRequest::one_shot("emit")
    }).await?;

    wait_for_state(&scheduler, head, WorkState::Running)
        .await
        .expect("head started");

    let cancelled = scheduler.cancel_by_tag("batch").await?;
    assert_eq!(cancelled.len(), 2);

    wait_for_state(&scheduler, head, WorkState::Cancelled)
        .await
        .expect("running head cancelled");
    wait_for_state(&scheduler, dependent, WorkState::Cancelled)
        .await
        .expect("dependent cancelled");
    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_running_work() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut scheduler = started_scheduler(&dir, base_registry()).await?;

    let id = scheduler.enqueue(WorkRequest::one_shot("progress")).await?;
    wait_for_state(&scheduler, id, WorkState::Running)
        .await
        .expect("work started");

    scheduler.shutdown().await;

    // the in-flight attempt was allowed to finish
    let record = scheduler.platform().get_work(id).await?.expect("present");
    assert_eq!(record.state, WorkState::Succeeded);
    Ok(())
}
