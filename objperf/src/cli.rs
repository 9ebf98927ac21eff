//! Command line arguments of the benchmark binaries and their execution.
//!
//! Each binary parses its own argument struct and hands it to [`execute`] wrapped in a [`Command`].
//! Results are printed to stdout, everything else goes to the logs on stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use objperf_client::{BoxedClient, S3Client, StorageClient};

use crate::bench::Bench;
use crate::config::Config;
use crate::metrics::MIB;
use crate::observability;
use crate::payload::Payload;
use crate::report::{BandwidthLine, CountReport, DurationReport};

/// Measure read bandwidth of a single cached object.
///
/// Uploads one object, then downloads it repeatedly from all threads for the given duration.
#[derive(Debug, FromArgs)]
#[argh(example = "{command_name} 10 4 30")]
pub struct GetCachedArgs {
    /// object size in MB
    #[argh(positional, from_str_fn(megabytes))]
    pub size: u64,

    /// number of concurrent threads
    #[argh(positional, from_str_fn(count))]
    pub thread_count: usize,

    /// measurement duration in seconds
    #[argh(positional, from_str_fn(seconds))]
    pub duration: Duration,

    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Measure read bandwidth of distinct objects downloaded in parallel.
///
/// Drop the page cache of the storage service (`echo 3 > /proc/sys/vm/drop_caches`) between
/// `--populate` and the measurement, so that there is no cache effect.
#[derive(Debug, FromArgs)]
#[argh(example = "{command_name} 64 20 --populate\n{command_name} 64 20")]
pub struct GetUncachedArgs {
    /// object size in MB
    #[argh(positional, from_str_fn(megabytes))]
    pub size: u64,

    /// number of objects downloaded in parallel
    #[argh(positional, from_str_fn(count))]
    pub parallel_count: usize,

    /// upload the objects and exit without measuring
    #[argh(switch)]
    pub populate: bool,

    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Measure write bandwidth of objects uploaded in parallel.
///
/// Runs one test per object size. Removes all objects from the bucket before each test.
#[derive(Debug, FromArgs)]
#[argh(example = "{command_name} 2,8,32,128 20")]
pub struct PutCachedArgs {
    /// comma separated object sizes in MB
    #[argh(positional, from_str_fn(megabyte_list))]
    pub sizes: SizeList,

    /// number of objects uploaded in parallel
    #[argh(positional, from_str_fn(count))]
    pub parallel_count: usize,

    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Measure write bandwidth of fresh objects uploaded continuously.
///
/// Runs one test per object size. Removes all objects from the bucket before each test.
#[derive(Debug, FromArgs)]
#[argh(example = "{command_name} 2,8,32,128 20 180")]
pub struct PutUncachedArgs {
    /// comma separated object sizes in MB
    #[argh(positional, from_str_fn(megabyte_list))]
    pub sizes: SizeList,

    /// number of concurrent threads
    #[argh(positional, from_str_fn(count))]
    pub thread_count: usize,

    /// measurement duration in seconds, per object size
    #[argh(positional, from_str_fn(seconds))]
    pub duration: Duration,

    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

/// Object sizes in bytes, given on the command line as comma separated MB values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeList(pub Vec<u64>);

impl SizeList {
    fn max(&self) -> u64 {
        self.0.iter().copied().max().unwrap_or_default()
    }
}

fn megabytes(value: &str) -> Result<u64, String> {
    let megabytes = positive(value)?;
    megabytes
        .checked_mul(MIB as u64)
        .ok_or_else(|| format!("`{value}` MB is too large"))
}

fn megabyte_list(value: &str) -> Result<SizeList, String> {
    value.split(',').map(megabytes).collect::<Result<_, _>>().map(SizeList)
}

fn count(value: &str) -> Result<usize, String> {
    positive(value).and_then(|count| usize::try_from(count).map_err(|e| e.to_string()))
}

fn seconds(value: &str) -> Result<Duration, String> {
    positive(value).map(Duration::from_secs)
}

fn positive(value: &str) -> Result<u64, String> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_owned()),
        Ok(number) => Ok(number),
        Err(_) => Err(format!("`{value}` is not a number")),
    }
}

/// A parsed invocation of one of the benchmark binaries.
#[derive(Debug)]
pub enum Command {
    /// `perf-get-cached`
    GetCached(GetCachedArgs),
    /// `perf-get-uncached`
    GetUncached(GetUncachedArgs),
    /// `perf-put-cached`
    PutCached(PutCachedArgs),
    /// `perf-put-uncached`
    PutUncached(PutUncachedArgs),
}

impl Command {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Command::GetCached(args) => args.config.as_deref(),
            Command::GetUncached(args) => args.config.as_deref(),
            Command::PutCached(args) => args.config.as_deref(),
            Command::PutUncached(args) => args.config.as_deref(),
        }
    }

    /// The largest object size this command uploads, or `None` if it only reads.
    fn upload_size(&self) -> Option<u64> {
        match self {
            Command::GetCached(args) => Some(args.size),
            Command::GetUncached(args) => args.populate.then_some(args.size),
            Command::PutCached(args) => Some(args.sizes.max()),
            Command::PutUncached(args) => Some(args.sizes.max()),
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute(command: Command) -> Result<()> {
    let config = Config::load(command.config_path()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("objperf-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::initialize_tracing(&config);
    tracing::debug!(?config);

    let client = S3Client::new(config.client_config()).context("failed to create client")?;
    let client: BoxedClient = Arc::new(client);
    tracing::info!(endpoint = %config.endpoint, bucket = %config.bucket, "starting benchmark");

    runtime.block_on(run(&command, &config, client, &mut std::io::stdout()))
}

/// Runs the benchmark and writes its report lines to `out`.
async fn run(
    command: &Command,
    config: &Config,
    client: BoxedClient,
    out: &mut impl Write,
) -> Result<()> {
    let payload = match command.upload_size() {
        Some(max_size) => Some(Payload::open(&config.payload, max_size)?),
        None => None,
    };
    let payload = payload.as_ref();
    let bench = Bench::new(Arc::clone(&client), config);
    tracing::debug!(client = client.name(), "using storage client");

    match command {
        Command::GetCached(args) => {
            let payload = payload.context("missing payload")?;
            let result = bench
                .get_cached(args.size, args.thread_count, args.duration, payload)
                .await?;
            writeln!(out, "{}", BandwidthLine(result.bandwidth_mbps))?;
        }
        Command::GetUncached(args) if args.populate => {
            let payload = payload.context("missing payload")?;
            bench.populate(args.size, args.parallel_count, payload).await?;
        }
        Command::GetUncached(args) => {
            let result = bench.get_uncached(args.size, args.parallel_count).await?;
            serde_json::to_writer(&mut *out, &CountReport::from(&result))?;
            writeln!(out)?;
        }
        Command::PutCached(args) => {
            let payload = payload.context("missing payload")?;
            for &size in &args.sizes.0 {
                let result = bench.put_cached(size, args.parallel_count, payload).await?;
                serde_json::to_writer(&mut *out, &CountReport::from(&result))?;
                writeln!(out)?;
            }
        }
        Command::PutUncached(args) => {
            let payload = payload.context("missing payload")?;
            for &size in &args.sizes.0 {
                let result = bench
                    .put_uncached(size, args.thread_count, args.duration, payload)
                    .await?;
                serde_json::to_writer(&mut *out, &DurationReport::from(&result))?;
                writeln!(out)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}
