//! CLI surface (SPEC_FULL §14), grounded on the teacher's `opt.rs` flattened-sub-struct style and
//! its `LoggerOpt::enable_log` verbosity-to-`RUST_LOG` mapping.

use std::path::PathBuf;

use clap::Parser;

/// `oj-worker --config <path> [--once] [-v]...`
#[derive(Parser, Debug)]
#[clap(name = "oj-worker", version)]
pub struct Opt {
    #[clap(flatten)]
    pub logger: LoggerOpt,

    /// Path to the YAML configuration file (SPEC_FULL §13). Defaults to the platform config
    /// directory, the same pattern the teacher uses for its cache directory.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Handle a single task then exit 0, instead of looping forever. Useful for smoke-testing
    /// outside the supervisor loop; not used in production.
    #[clap(long)]
    pub once: bool,

    /// Internal entry point used by the self-exec sandbox (spec §4.A): when present, the process
    /// reads a `SandboxConfiguration` as JSON from stdin, runs it, and prints a `RawSandboxResult`
    /// as JSON to stdout instead of doing anything else.
    #[clap(long, hide = true)]
    pub sandbox: bool,
}

/// Verbosity flags, raising the default log level when `RUST_LOG` is unset (teacher's
/// `LoggerOpt`).
#[derive(Parser, Debug)]
pub struct LoggerOpt {
    /// Increase the log verbosity; repeat for more (`-v` = info, `-vv` = debug, `-vvv` = trace).
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl LoggerOpt {
    /// Install `env_logger`, honoring `RUST_LOG` if already set, otherwise deriving a default
    /// filter from `-v` (SPEC_FULL §11).
    pub fn enable_log(&self) {
        if std::env::var_os("RUST_LOG").is_none() {
            let level = match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            std::env::set_var("RUST_LOG", format!("oj_worker={level},oj_worker_format={level}"));
        }
        env_logger::Builder::from_default_env()
            .format_timestamp_nanos()
            .init();
        better_panic::install();
    }
}
