use async_trait::async_trait;
use clap::Parser;
use dwqcore::{
    constraint::{Constraints, NetworkRequirement, NetworkState, Signals},
    input::Data,
    platform::PlatformConnector,
    work::{UniquePolicy, WorkFilter, WorkRequest},
};
use dwqdb_sqlite::SqliteBackend;
use dwqsched::{
    config::SchedulerConfig,
    handle::WorkHandle,
    registry::{WorkOutcome, Worker, WorkerRegistry},
    service::Builder,
};
use std::time::Duration;
use tokio_stream::StreamExt;

#[derive(Debug, Parser)]
struct Cli {
    #[clap(short = 'r', long = "runners", default_value = "4")]
    runners: usize,
    #[clap(long, value_name = "DWQ_DB_URL", env = "DWQ_DB_URL",
           default_value = "sqlite:dwqsched-demo.db")]
    dwq_db_url: String,
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Succeeds immediately, echoing its input as output.
struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    async fn run(&mut self, input: Data, handle: WorkHandle) -> WorkOutcome {
        log::info!("echo worker running as work {}", handle.work_id());
        WorkOutcome::Success(input)
    }
}

/// Sleeps in short slices, publishing progress and observing
/// cancellation cooperatively.
struct NapWorker;

#[async_trait]
impl Worker for NapWorker {
    async fn run(&mut self, _input: Data, handle: WorkHandle) -> WorkOutcome {
        for pct in [25i64, 50, 75, 100] {
            if handle.is_cancelled() {
                return WorkOutcome::failure();
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.publish_progress(Data::new().with("pct", pct));
        }
        WorkOutcome::success()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    stderrlog::new()
        .module(module_path!())
        .verbosity((args.verbose as usize) + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .unwrap();

    let platform = SqliteBackend::ws(args.dwq_db_url.as_str().into())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let mut registry = WorkerRegistry::new();
    registry.register("echo", || Box::new(EchoWorker) as Box<dyn Worker>);
    registry.register("nap", || Box::new(NapWorker) as Box<dyn Worker>);

    let mut scheduler = Builder::new()
        .platform(platform)
        .registry(registry)
        .config(SchedulerConfig {
            parallelism_cap: args.runners,
            .. Default::default()
        })
        .build();
    scheduler.startup().await;

    let mut signals = scheduler.signal_source()
        .expect("signal source is available after startup");
    signals.report(Signals {
        network: NetworkState::Unmetered,
        charging: true,
        .. Default::default()
    });

    let mut stream = scheduler.observe(WorkFilter::by_tag("demo")).await?;
    tokio::spawn(async move {
        while let Some(snapshot) = stream.next().await {
            log::info!(
                "work {} -> {:?} (attempt {}, runs {})",
                snapshot.id,
                snapshot.state,
                snapshot.attempt,
                snapshot.run_count,
            );
        }
    });

    // an immediate task, a constrained task, a periodic sync, and a
    // chained pipeline
    scheduler.enqueue(WorkRequest {
        input: Data::new().with("message", "hello"),
        tags: vec!["demo".into()],
        .. WorkRequest::one_shot("echo")
    }).await?;
    scheduler.enqueue(WorkRequest {
        constraints: Constraints {
            network: NetworkRequirement::Unmetered,
            requires_charging: true,
            .. Default::default()
        },
        tags: vec!["demo".into()],
        .. WorkRequest::one_shot("nap")
    }).await?;
    scheduler.enqueue_unique(
        "demo-sync",
        UniquePolicy::Keep,
        WorkRequest {
            tags: vec!["demo".into()],
            .. WorkRequest::periodic("echo", 15 * 60 * 1000, 5 * 60 * 1000)
        },
    ).await?;
    let head = scheduler.enqueue(WorkRequest {
        input: Data::new().with("stage", 1i64),
        tags: vec!["demo".into()],
        .. WorkRequest::one_shot("echo")
    }).await?;
    scheduler.enqueue(WorkRequest {
        prereqs: vec![head],
        tags: vec!["demo".into()],
        .. WorkRequest::one_shot("echo")
    }).await?;

    scheduler.wait_for_shutdown_signal().await;
    Ok(())
}
