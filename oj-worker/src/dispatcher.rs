//! Dispatcher channel (spec §6 "External interfaces"): the bidirectional, message-oriented
//! protocol between a worker and its dispatcher.
//!
//! The transport itself is out of scope (spec §1: "only their contracts are specified"); this
//! module defines the message shapes and a thin wrapper around `ductile`'s blocking channel,
//! grounded on the teacher's `remote.rs`/`worker.rs` connection pattern.

use std::net::SocketAddr;

use anyhow::{Context, Error};
use ductile::{connect_channel, ChannelReceiver, ChannelSender};
use serde::{Deserialize, Serialize};

use oj_worker_format::{ProgressSnapshot, ProblemType};

/// A submission task as it arrives over the wire (spec §3 "Submission task").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_id: u64,
    pub problem_type: ProblemType,
    pub plan_yaml: String,
    pub manifest_json: String,
    pub source: String,
    pub language: String,
    pub compile_options: Vec<String>,
    pub submitted_archive_url: Option<String>,
    pub skip_samples: bool,
}

/// `serverSideLimits`: byte counts the dispatcher imposes on every truncated field (spec §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerSideLimits {
    pub compiler_message: u64,
    pub output_size: u64,
    pub data_display: u64,
    pub data_display_for_submit_answer: u64,
    pub stderr_display: u64,
}

/// Client -> server messages (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerClientMessage {
    Ready,
    Consume { thread_index: usize },
    Progress { task_id: u64, snapshot: Box<ProgressSnapshot> },
    RequestFiles { content_ids: Vec<String> },
    SystemInfo { info: String },
}

/// Server -> client messages (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerServerMessage {
    Authorized { name: String, limits: ServerSideLimits },
    Task { thread_index: usize, task: TaskPayload },
    Cancel { task_id: u64 },
    AuthFailed,
    /// URLs resolved for a prior `RequestFiles` (not itemized as its own spec message, but implied
    /// by "`requestFiles(contentIds) -> urls`" being a request/response pair over the same
    /// channel).
    FileUrls { urls: Vec<String> },
}

/// A connected, authenticated dispatcher channel.
pub struct DispatcherChannel {
    tx: ChannelSender<WorkerClientMessage>,
    rx: ChannelReceiver<WorkerServerMessage>,
}

impl DispatcherChannel {
    /// Connect to `server_addr` and send the authentication handshake (teacher's `worker.rs`:
    /// connect, then send a welcome/identity message before anything else).
    pub fn connect(server_addr: SocketAddr, name: &str, key: &str) -> Result<DispatcherChannel, Error> {
        let (tx, rx) = connect_channel(server_addr).context("Failed to connect to the dispatcher")?;
        tx.send(WorkerClientMessage::SystemInfo {
            info: format!("{name} key={key}"),
        })
        .context("Failed to send the handshake to the dispatcher")?;
        Ok(DispatcherChannel { tx, rx })
    }

    pub fn send(&self, message: WorkerClientMessage) -> Result<(), Error> {
        self.tx.send(message).context("Failed to send message to the dispatcher")
    }

    /// Block until the dispatcher sends the next message. Run on a blocking thread by the worker
    /// loop (spec §5: "awaiting a dispatched download URL" etc. are suspension points, not
    /// blocking ones, from the single-orchestrator-task's point of view).
    pub fn recv(&self) -> Result<WorkerServerMessage, Error> {
        self.rx.recv().context("Dispatcher connection lost")
    }
}
