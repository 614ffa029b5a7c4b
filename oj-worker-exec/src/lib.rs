//! Sandboxed-execution layer: spec component A (the `tabox`-backed sandbox invoker) and
//! component C (the task-slot scheduler). Everything above this crate talks only to
//! [`Sandbox`]/[`SandboxRunner`]/[`Scheduler`] and the data types in `oj-worker-dag`.

#[macro_use]
extern crate log;

mod detect_exe;
mod sandbox;
mod sandbox_runner;
mod scheduler;

pub use sandbox::{RawSandboxResult, RunningSandbox, Sandbox, READABLE_DIRS};
pub use sandbox_runner::{ErrorSandboxRunner, FakeSandboxRunner, SandboxRunner, SuccessSandboxRunner};
pub use scheduler::{Disposer, Scheduler};
