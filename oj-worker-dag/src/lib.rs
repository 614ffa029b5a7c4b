//! Primitive types shared by every crate that talks to the sandbox: resource limits, the
//! parameters of a single sandboxed run, and the result it produces.
//!
//! This crate intentionally knows nothing about compiling, checking, or scoring: it only
//! describes what it means to run one program under the isolation primitive, in either
//! blocking (`run`) or dual-process (`start`/`stop`) mode. [`oj-worker-exec`](../oj_worker_exec)
//! is the only crate that implements these contracts against a real sandbox.

mod limits;
mod params;
mod result;

pub use limits::ExecutionLimits;
pub use params::{Affinity, BindMount, CpuAffinityTarget, Redirect, SandboxParams};
pub use result::{ExecutionResourcesUsage, SandboxResult, SandboxStatus};
