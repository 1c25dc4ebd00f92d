//! tickwork-soak: load test for the scheduling primitives.
//!
//! Runs three phases against one shared worker pool:
//! - mailboxes: producer threads flood FIFO and priority mailboxes while every
//!   task checks that no other task of its mailbox is running
//! - parallel map: one large map transform, checked against the expected output
//! - event loop: helper threads submit blocking work to a loop owned by the
//!   main thread, which services it from `managed_block`
//!
//! Prints a JSON report with per-executor metrics on success.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use tickwork_scheduler::parallel_map;
use tickwork_scheduler::{
    build_worker_pool, load_dotenv, BlockableEventLoop, ConsecutiveExecutor, ExecutorMetrics,
    Immediate, MetricsSource, PriorityConsecutiveExecutor, SchedulerConfig, TaskScheduler,
    WorkerPool,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Soak test for tickwork mailboxes, parallel map and event loop.
#[derive(Parser, Debug)]
#[command(name = "tickwork-soak", version, about)]
struct Cli {
    /// Number of FIFO mailboxes sharing the pool.
    #[arg(long, env = "SOAK_EXECUTORS", default_value_t = 4)]
    executors: usize,

    /// Producer threads per phase.
    #[arg(long, env = "SOAK_PRODUCERS", default_value_t = 4)]
    producers: usize,

    /// Tasks each producer submits to each mailbox.
    #[arg(long, env = "SOAK_TASKS", default_value_t = 2_000)]
    tasks: usize,

    /// Entries in the parallel map input.
    #[arg(long, env = "SOAK_MAP_SIZE", default_value_t = 100_000)]
    map_size: u64,

    /// Blocking submissions each producer makes to the event loop.
    #[arg(long, env = "SOAK_LOOP_TASKS", default_value_t = 500)]
    loop_tasks: usize,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    config: SchedulerConfig,
    mailboxes: Vec<ExecutorMetrics>,
    map: MapReport,
    event_loop: ExecutorMetrics,
}

#[derive(Debug, Serialize)]
struct MapReport {
    input_entries: u64,
    output_entries: usize,
    elapsed: Duration,
}

// ── Mailboxes ───────────────────────────────────────────────────────

/// Per-mailbox overlap detector.
#[derive(Default)]
struct FlightCheck {
    active: AtomicUsize,
    overlaps: AtomicUsize,
}

impl FlightCheck {
    fn enter(&self) {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn soak_mailboxes(
    cli: &Cli,
    config: &SchedulerConfig,
    pool: &Arc<dyn WorkerPool>,
) -> anyhow::Result<Vec<ExecutorMetrics>> {
    let fifo: Vec<_> = (0..cli.executors)
        .map(|i| {
            (
                ConsecutiveExecutor::new(format!("fifo-{}", i), Arc::clone(pool)),
                Arc::new(FlightCheck::default()),
            )
        })
        .collect();
    let lanes = config.priority_lanes.max(1);
    let priority = PriorityConsecutiveExecutor::new("priority", lanes, Arc::clone(pool));
    let priority_check = Arc::new(FlightCheck::default());

    let started = Instant::now();
    thread::scope(|s| {
        for producer in 0..cli.producers {
            let fifo = &fifo;
            let priority = &priority;
            let priority_check = &priority_check;
            s.spawn(move || {
                for n in 0..cli.tasks {
                    for (executor, check) in fifo {
                        let check = Arc::clone(check);
                        executor.execute(move || {
                            check.enter();
                            thread::yield_now();
                            check.leave();
                        });
                    }
                    let check = Arc::clone(priority_check);
                    priority.execute_with_priority((producer + n) % lanes, move || {
                        check.enter();
                        check.leave();
                    });
                }
            });
        }
    });

    for (executor, _) in &fifo {
        executor
            .schedule_with_result(|done| {
                done.complete(());
            })
            .join()
            .with_context(|| format!("flushing {}", executor.name()))?;
    }
    priority
        .schedule_with_priority(lanes - 1, |done| {
            done.complete(());
        })
        .join()
        .context("flushing priority mailbox")?;

    let overlaps: usize = fifo
        .iter()
        .map(|(_, check)| check)
        .chain([&priority_check])
        .map(|check| check.overlaps.load(Ordering::SeqCst))
        .sum();
    if overlaps > 0 {
        bail!("single-flight violated {} times", overlaps);
    }
    info!(
        mailboxes = fifo.len() + 1,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mailbox phase complete"
    );

    let mut metrics: Vec<_> = fifo.iter().map(|(executor, _)| executor.metrics()).collect();
    metrics.push(priority.metrics());
    Ok(metrics)
}

// ── Parallel map ────────────────────────────────────────────────────

fn soak_parallel_map(
    cli: &Cli,
    config: &SchedulerConfig,
    pool: &Arc<dyn WorkerPool>,
) -> anyhow::Result<MapReport> {
    let input: HashMap<u64, u64> = (0..cli.map_size).map(|i| (i, i)).collect();
    let started = Instant::now();

    let output = parallel_map::schedule_with_config(
        input,
        |key, value| (value % 7 != 0).then(|| key.wrapping_mul(*value)),
        config,
        pool,
    )
    .join()
    .context("parallel map failed")?;

    let expected = (0..cli.map_size).filter(|v| v % 7 != 0).count();
    if output.len() != expected {
        bail!("parallel map produced {} entries, expected {}", output.len(), expected);
    }
    if let Some((key, value)) = output.iter().find(|(k, v)| **v != k.wrapping_mul(**k)) {
        bail!("parallel map produced {} for key {}", value, key);
    }

    let elapsed = started.elapsed();
    info!(
        entries = output.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "parallel map phase complete"
    );
    Ok(MapReport {
        input_entries: cli.map_size,
        output_entries: output.len(),
        elapsed,
    })
}

// ── Event loop ──────────────────────────────────────────────────────

/// Counts a producer as finished when its thread exits, unwinding included.
struct ProducerDone<'a>(&'a AtomicUsize);

impl Drop for ProducerDone<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn soak_event_loop(cli: &Cli, config: &SchedulerConfig) -> anyhow::Result<ExecutorMetrics> {
    let event_loop =
        BlockableEventLoop::for_current_thread("soak-loop", Immediate).configured(config);
    let finished = AtomicUsize::new(0);
    let counter = Arc::new(AtomicUsize::new(0));

    let results = thread::scope(|s| {
        let producers: Vec<_> = (0..cli.producers)
            .map(|_| {
                let (event_loop, finished, counter) = (&event_loop, &finished, &counter);
                s.spawn(move || {
                    let _done = ProducerDone(finished);
                    let mut last = 0;
                    for _ in 0..cli.loop_tasks {
                        let counter = Arc::clone(counter);
                        let value = event_loop.execute_blocking(move || {
                            counter.fetch_add(1, Ordering::SeqCst) + 1
                        })?;
                        last = last.max(value);
                    }
                    Ok::<usize, tickwork_core::TaskError>(last)
                })
            })
            .collect();

        event_loop.managed_block(|| finished.load(Ordering::SeqCst) == cli.producers);
        producers
            .into_iter()
            .map(|producer| producer.join())
            .collect::<Vec<_>>()
    });

    for result in results {
        match result {
            Ok(outcome) => {
                outcome.context("event loop task failed")?;
            }
            Err(_) => bail!("event loop producer panicked"),
        }
    }

    let total = cli.producers * cli.loop_tasks;
    let ran = counter.load(Ordering::SeqCst);
    if ran != total {
        bail!("event loop ran {} tasks, expected {}", ran, total);
    }
    info!(tasks = ran, "event loop phase complete");
    Ok(event_loop.metrics())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = SchedulerConfig::try_from_env()?;
    config.log_summary();

    let pool: Arc<dyn WorkerPool> = Arc::new(build_worker_pool(&config)?);
    info!(?cli, "tickwork-soak starting");

    let mailboxes = soak_mailboxes(&cli, &config, &pool)?;
    let map = soak_parallel_map(&cli, &config, &pool)?;
    let event_loop = soak_event_loop(&cli, &config)?;

    let report = Report {
        config,
        mailboxes,
        map,
        event_loop,
    };
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);

    info!("tickwork-soak finished");
    Ok(())
}
