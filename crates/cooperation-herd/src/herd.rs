use crate::config::{HerdConfig, Mode};
use anyhow::{anyhow, bail};
use cooperation::{Coordinator, CooperationAsyncTokioExt, Error};
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use std::{
    sync::{
        Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread::scope,
    time::Instant,
};
use tracing::{debug, info};

type Outcome = Result<u64, Error<String>>;

/// What happened to one herd.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub mode: Mode,
    pub enabled: bool,
    pub threads_per_key: usize,
    pub callers: usize,
    pub keys: usize,
    /// Times the simulated work actually ran, across all keys.
    pub executions: usize,
    /// Executions per key, indexed by key number.
    pub executions_per_key: Vec<usize>,
    pub successes: usize,
    /// Callers that received a work failure, their own or a shared one.
    pub shared_failures: usize,
    pub timeouts: usize,
    /// Callers served per execution. 1.0 means no work was deduplicated.
    pub dedup_ratio: f64,
    pub wall_ms: u128,
}

impl Report {
    pub fn log(&self) {
        for (key, executions) in self.executions_per_key.iter().enumerate() {
            debug!(key, executions, "per-key executions");
        }
        info!(
            mode = ?self.mode,
            enabled = self.enabled,
            threads_per_key = self.threads_per_key,
            callers = self.callers,
            keys = self.keys,
            executions = self.executions,
            successes = self.successes,
            shared_failures = self.shared_failures,
            timeouts = self.timeouts,
            dedup_ratio = self.dedup_ratio,
            wall_ms = self.wall_ms,
            "herd finished"
        );
    }
}

/// Per-key execution counters shared by every caller's work.
struct Counters {
    executions: Vec<AtomicUsize>,
}

impl Counters {
    fn new(keys: usize) -> Self {
        Self {
            executions: (0..keys).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Records an execution for `key` and returns its sequence number.
    fn record(&self, key: usize) -> u64 {
        self.executions[key].fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn snapshot(&self) -> Vec<usize> {
        self.executions
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect()
    }
}

fn key_name(key: usize) -> String {
    format!("artifact-{key}")
}

fn simulated_outcome(key: usize, execution: u64, fail_ratio: f64) -> Result<u64, String> {
    if fail_ratio > 0.0 && rand::rng().random_bool(fail_ratio) {
        Err(format!("{} unavailable (execution {execution})", key_name(key)))
    } else {
        Ok(execution)
    }
}

/// Builds a coordinator from `config` and releases every caller at once.
pub fn run(config: &HerdConfig) -> anyhow::Result<Report> {
    let coordinator = config.builder.build::<u64, String>("herd")?;
    let counters = Counters::new(config.keys);

    let started = Instant::now();
    let outcomes = match config.mode {
        Mode::Threads => run_threads(config, &coordinator, &counters)?,
        Mode::Tokio => run_tokio(config, &coordinator, &counters)?,
    };
    let wall_ms = started.elapsed().as_millis();

    let mut successes = 0;
    let mut shared_failures = 0;
    let mut timeouts = 0;
    for outcome in outcomes {
        match outcome {
            Ok(_) => successes += 1,
            Err(Error::Work(_)) => shared_failures += 1,
            Err(Error::Timeout { .. }) => timeouts += 1,
            Err(err) => bail!("coordinator failed: {err}"),
        }
    }

    let executions_per_key = counters.snapshot();
    let executions = executions_per_key.iter().sum::<usize>();
    Ok(Report {
        mode: config.mode,
        enabled: config.cooperation.enabled(),
        threads_per_key: config.cooperation.threads_per_key(),
        callers: config.callers,
        keys: config.keys,
        executions,
        executions_per_key,
        successes,
        shared_failures,
        timeouts,
        dedup_ratio: config.callers as f64 / executions.max(1) as f64,
        wall_ms,
    })
}

fn run_threads(
    config: &HerdConfig,
    coordinator: &Coordinator<u64, String>,
    counters: &Counters,
) -> anyhow::Result<Vec<Outcome>> {
    let barrier = Barrier::new(config.callers);
    scope(|s| {
        let handles: Vec<_> = (0..config.callers)
            .map(|caller| {
                let key = caller % config.keys;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    coordinator.run(&key_name(key), || {
                        let execution = counters.record(key);
                        std::thread::sleep(config.work);
                        simulated_outcome(key, execution, config.fail_ratio)
                    })
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| anyhow!("caller thread panicked")))
            .collect()
    })
}

fn run_tokio(
    config: &HerdConfig,
    coordinator: &Coordinator<u64, String>,
    counters: &Counters,
) -> anyhow::Result<Vec<Outcome>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;

    let keys: Vec<String> = (0..config.keys).map(key_name).collect();
    let outcomes = runtime.block_on(async {
        let callers = (0..config.callers).map(|caller| {
            let key = caller % config.keys;
            coordinator.run_async(&keys[key], move || async move {
                let execution = counters.record(key);
                tokio::time::sleep(config.work).await;
                simulated_outcome(key, execution, config.fail_ratio)
            })
        });
        join_all(callers).await
    });
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use clap::Parser;

    fn config(callers: usize, keys: usize, args: &[&str]) -> HerdConfig {
        let callers = callers.to_string();
        let keys = keys.to_string();
        let args = CliArgs::try_parse_from(
            [
                "cooperation-herd",
                "--callers",
                callers.as_str(),
                "--keys",
                keys.as_str(),
                "--work-ms",
                "100",
            ]
            .into_iter()
            .chain(args.iter().copied()),
        )
        .unwrap();
        HerdConfig::try_from(args).unwrap()
    }

    fn run_dedups_per_key(mode: &str) {
        let report = run(&config(16, 2, &["--mode", mode])).unwrap();
        assert_eq!(report.executions_per_key, vec![1, 1]);
        assert_eq!(report.successes, 16);
        assert_eq!(report.timeouts, 0);
        assert_eq!(report.dedup_ratio, 8.0);
    }

    #[test]
    fn threads_dedup_per_key() {
        run_dedups_per_key("threads");
    }

    #[test]
    fn tokio_dedups_per_key() {
        run_dedups_per_key("tokio");
    }

    #[test]
    fn disabled_runs_every_caller() {
        let report = run(&config(16, 2, &["--enabled", "false"])).unwrap();
        assert_eq!(report.executions, 16);
        assert_eq!(report.dedup_ratio, 1.0);
        assert!(!report.enabled);
    }

    #[test]
    fn failures_are_shared() {
        let report = run(&config(16, 2, &["--fail-ratio", "1"])).unwrap();
        assert_eq!(report.executions, 2);
        assert_eq!(report.shared_failures, 16);
        assert_eq!(report.successes, 0);
    }

    #[test]
    fn short_major_timeout_times_out_waiters() {
        let report = run(&config(
            16,
            1,
            &["--major-timeout-ms", "20", "--minor-timeout-ms", "5"],
        ))
        .unwrap();
        assert_eq!(report.executions, 1);
        assert_eq!(report.successes, 1);
        assert_eq!(report.timeouts, 15);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = run(&config(2, 2, &[])).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "threads");
        assert_eq!(json["callers"], 2);
        assert_eq!(json["executions"], 2);
    }
}
