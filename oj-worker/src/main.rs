//! Entry point (SPEC_FULL §14): parses the CLI, loads the configuration, connects to the
//! dispatcher and runs the worker loop until it is told to stop.

#[macro_use]
extern crate log;

mod compile;
mod config;
mod dispatcher;
mod error;
mod opt;
mod sandbox;
mod task;
mod worker;

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use config::Config;
use dispatcher::DispatcherChannel;
use error::NiceError;
use oj_worker_cache::CompileCache;
use oj_worker_exec::Scheduler;
use oj_worker_store::FileStore;
use opt::Opt;
use sandbox::SelfExecSandboxRunner;
use worker::{StopReason, WorkerContext};

fn main() {
    let opt = Opt::parse();

    // Self-exec sandbox entry point (spec §4.A): this must happen before anything else touches
    // logging or the dispatcher, since the re-exec'd child talks JSON on stdin/stdout only.
    if opt.sandbox {
        sandbox::main_sandbox();
        return;
    }

    opt.logger.enable_log();

    let exit_code = run(opt).nice_unwrap();
    std::process::exit(exit_code);
}

fn run(opt: Opt) -> anyhow::Result<i32> {
    let config_path = opt.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    config.reset_binary_cache_store()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    runtime.block_on(run_async(config, opt.once))
}

async fn run_async(config: Config, once: bool) -> anyhow::Result<i32> {
    let server_addr = config
        .server_url
        .trim_start_matches("tcp://")
        .to_socket_addrs()
        .map_err(|e| anyhow::anyhow!("Invalid server_url {:?}: {e}", config.server_url))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("server_url {:?} did not resolve to any address", config.server_url))?;

    let name = format!("{}@{}", whoami::username(), whoami::hostname());
    info!("Connecting to the dispatcher at {server_addr} as {name}");
    let dispatcher = Arc::new(DispatcherChannel::connect(server_addr, &name, &config.key)?);

    let file_store = Arc::new(FileStore::new(
        &config.data_store,
        config.binary_cache_max_size,
        config.binary_cache_max_size / 2,
    )?);
    let cache = Arc::new(CompileCache::new(
        &config.binary_cache_store,
        config.binary_cache_max_size,
        config.binary_cache_max_size / 2,
    )?);
    let scheduler = Arc::new(Scheduler::new(
        config.task_working_directories.clone(),
        config.max_concurrent_tasks,
    )?);

    let ctx = Arc::new(WorkerContext {
        file_store,
        cache,
        scheduler,
        sandboxes_dir: config.data_store.join("sandboxes"),
        slots_root: config.data_store.join("slots"),
        runner: Arc::new(SelfExecSandboxRunner),
        max_binary_size: config.binary_cache_max_size,
        limits: default_limits(),
    });

    let shutdown = CancellationToken::new();
    install_ctrlc_handler(shutdown.clone());

    let reason = worker::run(dispatcher, config.task_consuming_threads, ctx, once, shutdown).await?;
    match reason {
        StopReason::Normal => Ok(0),
        StopReason::DispatcherLost => Ok(100),
    }
}

/// Fallback limits used until the dispatcher's `authorized` message overwrites them (spec §6):
/// the worker announces readiness before it has received any, so something sane must exist in
/// the meantime.
fn default_limits() -> dispatcher::ServerSideLimits {
    dispatcher::ServerSideLimits {
        compiler_message: 64 * 1024,
        output_size: 1024 * 1024,
        data_display: 8 * 1024,
        data_display_for_submit_answer: 1024 * 1024,
        stderr_display: 8 * 1024,
    }
}

/// Install a Ctrl-C handler that cancels `shutdown` exactly once (SPEC_FULL §16: a second Ctrl-C
/// while shutting down is ignored rather than escalating, unlike the teacher's UI which has
/// nothing to gracefully stop).
fn install_ctrlc_handler(shutdown: CancellationToken) {
    let fired = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if !fired.swap(true, Ordering::SeqCst) {
            warn!("Received Ctrl-C, finishing in-flight tasks before exiting");
            shutdown.cancel();
        }
    })
    .expect("failed to install the Ctrl-C handler");
}
