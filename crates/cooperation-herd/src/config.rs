use anyhow::{Context, bail};
use clap::{ArgAction, Parser, ValueEnum};
use cooperation::{Builder, CooperationConfig, configure};
use core::time::Duration;
use serde::Serialize;

/// How the simulated callers are scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One OS thread per caller, using the blocking `run`.
    Threads,
    /// One future per caller on a multi-threaded tokio runtime, using
    /// `run_async`.
    Tokio,
}

/// Runtime configuration for the `cooperation-herd` binary.
///
/// Coordinator tunables mirror the library builder. Herd settings shape the
/// simulated load. Every value can come from a flag, an environment variable
/// or a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cooperation-herd",
    version,
    about = "Simulates a thundering herd against a cooperation coordinator"
)]
pub struct CliArgs {
    /// Turn coordination on or off. When off, every caller runs the work.
    ///
    /// Environment variable: `COOPERATION_ENABLED`
    #[arg(long, env = "COOPERATION_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub enabled: bool,

    /// Longest time a waiter waits for a result, in milliseconds.
    ///
    /// Environment variable: `COOPERATION_MAJOR_TIMEOUT_MS`
    #[arg(
        long,
        env = "COOPERATION_MAJOR_TIMEOUT_MS",
        default_value_t = 30_000,
        allow_negative_numbers = true
    )]
    pub major_timeout_ms: i64,

    /// How often a waiter re-checks for a result, in milliseconds.
    ///
    /// Environment variable: `COOPERATION_MINOR_TIMEOUT_MS`
    #[arg(
        long,
        env = "COOPERATION_MINOR_TIMEOUT_MS",
        default_value_t = 50,
        allow_negative_numbers = true
    )]
    pub minor_timeout_ms: i64,

    /// How many callers may run the work for one key at the same time.
    ///
    /// Environment variable: `COOPERATION_THREADS_PER_KEY`
    #[arg(long, env = "COOPERATION_THREADS_PER_KEY", default_value_t = 1)]
    pub threads_per_key: usize,

    /// Number of concurrent callers released at once.
    ///
    /// Environment variable: `HERD_CALLERS`
    #[arg(long, env = "HERD_CALLERS", default_value_t = 64)]
    pub callers: usize,

    /// Number of distinct keys. Callers are assigned round-robin.
    ///
    /// Environment variable: `HERD_KEYS`
    #[arg(long, env = "HERD_KEYS", default_value_t = 4)]
    pub keys: usize,

    /// Duration of one simulated unit of work, in milliseconds.
    ///
    /// Environment variable: `HERD_WORK_MS`
    #[arg(long, env = "HERD_WORK_MS", default_value_t = 200)]
    pub work_ms: u64,

    /// Probability in `[0, 1]` that a unit of work fails.
    ///
    /// Environment variable: `HERD_FAIL_RATIO`
    #[arg(long, env = "HERD_FAIL_RATIO", default_value_t = 0.0)]
    pub fail_ratio: f64,

    /// Schedule callers as OS threads or tokio tasks.
    ///
    /// Environment variable: `HERD_MODE`
    #[arg(long, env = "HERD_MODE", value_enum, default_value_t = Mode::Threads)]
    pub mode: Mode,

    /// Print the report as JSON on stdout instead of logging it.
    ///
    /// Environment variable: `HERD_JSON`
    #[arg(long, env = "HERD_JSON", default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct HerdConfig {
    pub builder: Builder,
    pub cooperation: CooperationConfig,
    pub callers: usize,
    pub keys: usize,
    pub work: Duration,
    pub fail_ratio: f64,
    pub mode: Mode,
    pub json: bool,
}

impl TryFrom<CliArgs> for HerdConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let major = CooperationConfig::timeout_from_millis(args.major_timeout_ms)
            .context("invalid COOPERATION_MAJOR_TIMEOUT_MS")?;
        let minor = CooperationConfig::timeout_from_millis(args.minor_timeout_ms)
            .context("invalid COOPERATION_MINOR_TIMEOUT_MS")?;

        let builder = configure()
            .enabled(args.enabled)
            .major_timeout(major)
            .minor_timeout(minor)
            .threads_per_key(args.threads_per_key);
        let cooperation = builder
            .config()
            .context("invalid cooperation settings")?;

        if args.callers == 0 {
            bail!("HERD_CALLERS must be greater than 0");
        }

        if args.keys == 0 {
            bail!("HERD_KEYS must be greater than 0");
        }

        if !(0.0..=1.0).contains(&args.fail_ratio) {
            bail!(
                "HERD_FAIL_RATIO ({}) must be between 0 and 1",
                args.fail_ratio
            );
        }

        Ok(Self {
            builder,
            cooperation,
            callers: args.callers,
            keys: args.keys,
            work: Duration::from_millis(args.work_ms),
            fail_ratio: args.fail_ratio,
            mode: args.mode,
            json: args.json,
        })
    }
}
