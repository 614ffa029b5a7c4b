//! Interfaces with `tabox`, building the sandbox directory and configuration for a single
//! sandboxed run and classifying its outcome into a [`SandboxResult`].

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Error};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tabox::configuration::SandboxConfiguration;
use tabox::syscall_filter::SyscallFilter;
use tempfile::TempDir;

use oj_worker_dag::{
    Affinity, BindMount, ExecutionResourcesUsage, Redirect, SandboxParams, SandboxStatus,
};

use oj_worker_dag::SandboxResult as Outcome;

use crate::detect_exe::detect_exe;
use crate::sandbox_runner::SandboxRunner;

/// System-wide directories that are always readable from inside the sandbox.
pub const READABLE_DIRS: &[&str] = &[
    "/lib",
    "/lib64",
    "/usr",
    "/bin",
    "/opt",
    // update-alternatives stuff, sometimes the executables are symlinked here
    "/etc/alternatives/",
    "/var/lib/dpkg/alternatives/",
    // required by texlive on Ubuntu
    "/var/lib/texmf/",
];

/// Sandbox-relative mount point where the interactive runner's FIFO pair is exposed.
const FIFO_SANDBOX_DIR: &str = "/fifo";

/// Relative path, inside the sandbox root, where the compiled binary/script to run lives if it
/// isn't an absolute host path.
const BOX_SUBDIR: &str = "box";

/// Time added on top of the requested time limit before the underlying sandbox enforces it, to
/// give the process a chance to flush output before being killed (spec §4.A).
const EXTRA_TIME_MS: u64 = 500;

/// Ratio applied to the CPU time limit to derive the wall time limit when only one limit is
/// given; a program waiting on I/O should not be charged CPU time but must still be bounded.
const WALL_TIME_RATIO: f64 = 2.0;

/// Internals of the sandbox, torn down on [`Drop`].
#[derive(Debug)]
struct SandboxData {
    /// Handle to the temporary directory, deleted on drop unless `keep_sandbox` is set. Always
    /// `Some` except inside `Drop` itself.
    boxdir: Option<TempDir>,
    params: SandboxParams,
    keep_sandbox: bool,
    fifo_dir: Option<PathBuf>,
    box_pid: Arc<AtomicU32>,
}

/// Response of the internal implementation of the sandbox.
#[derive(Debug)]
pub enum RawSandboxResult {
    Success(tabox::result::SandboxExecutionResult),
    Error(String),
}

/// Wrapper around a single sandboxed run. Cloning keeps the sandbox directory alive.
///
/// Unix-only: it needs to set the executable bit on some files and to chmod directories.
#[derive(Debug, Clone)]
pub struct Sandbox {
    data: Arc<Mutex<SandboxData>>,
}

/// A sandbox running on its own thread, as started by [`Sandbox::start`].
pub struct RunningSandbox {
    sandbox: Sandbox,
    handle: Option<std::thread::JoinHandle<Result<Outcome, Error>>>,
}

impl RunningSandbox {
    /// Block until the sandboxed process exits and return its classified outcome.
    pub fn wait_for_stop(mut self) -> Result<Outcome, Error> {
        self.handle
            .take()
            .expect("wait_for_stop called twice")
            .join()
            .map_err(|_| anyhow!("Sandbox thread panicked"))?
    }

    /// Ask the sandbox to terminate the process early; `wait_for_stop` still has to be called to
    /// observe the outcome and reclaim the thread.
    pub fn stop(&self) {
        self.sandbox.kill();
    }
}

impl Sandbox {
    /// Prepare a sandbox for `params`, installing every input file. Call `run` to start it.
    pub fn new(
        sandboxes_dir: &Path,
        params: &SandboxParams,
        fifo_dir: Option<PathBuf>,
    ) -> Result<Sandbox, Error> {
        std::fs::create_dir_all(sandboxes_dir).with_context(|| {
            format!(
                "Failed to create sandbox directory at {}",
                sandboxes_dir.display()
            )
        })?;
        let boxdir = TempDir::new_in(sandboxes_dir).context("Failed to create sandbox dir")?;
        Sandbox::setup(boxdir.path(), params).context("Sandbox setup failed")?;
        Ok(Sandbox {
            data: Arc::new(Mutex::new(SandboxData {
                boxdir: Some(boxdir),
                params: params.clone(),
                keep_sandbox: false,
                fifo_dir,
                box_pid: Arc::new(AtomicU32::new(0)),
            })),
        })
    }

    /// Start the sandbox on a dedicated thread without blocking the caller (spec §4.A
    /// `start`/`waitForStop`/`stop`, used by the interactive problem runner to run the user
    /// program and the interactor side by side).
    pub fn start(&self, runner: Arc<dyn SandboxRunner>) -> RunningSandbox {
        let sandbox = self.clone();
        let handle = std::thread::spawn(move || sandbox.run(runner.as_ref()));
        RunningSandbox {
            sandbox: self.clone(),
            handle: Some(handle),
        }
    }

    /// Start the sandbox and block until the sandboxed process exits.
    pub fn run(&self, runner: &dyn SandboxRunner) -> Result<Outcome, Error> {
        let mut config = SandboxConfiguration::default();
        let (boxdir, pid, keep, cmd, limits, inherited_fds) = {
            let data = self.data.lock().unwrap();
            (
                data.path().to_owned(),
                data.box_pid.clone(),
                data.keep_sandbox,
                self.build_command(data.path(), &data.params, &mut config, data.fifo_dir.clone()),
                data.params.limits,
                data.params.inherited_fds.clone(),
            )
        };
        trace!("Running sandbox at {:?}", boxdir);

        if let Err(e) = cmd {
            debug!("Failed to build sandbox configuration: {:#}", e);
            return Ok(Outcome {
                status: SandboxStatus::Unknown,
                exit_code: -1,
                resources: ExecutionResourcesUsage::default(),
            });
        }
        trace!("Sandbox configuration: {:#?}", config);

        // the fork happens inside `runner.run`; clear close-on-exec so these fds (pipes/shm used
        // by the interactive runner) survive into the sandboxed process, then restore it so this
        // process doesn't leak them across any other fork it does later.
        for fd in &inherited_fds {
            if let Err(e) = clear_cloexec(*fd) {
                warn!("Failed to clear close-on-exec on fd {}: {:?}", fd, e);
            }
        }
        let raw_result = runner.run(config.build(), pid);
        for fd in &inherited_fds {
            if let Err(e) = set_cloexec(*fd) {
                warn!("Failed to restore close-on-exec on fd {}: {:?}", fd, e);
            }
        }
        if keep {
            let target = boxdir.join("result.txt");
            std::fs::write(&target, format!("{:#?}", raw_result))
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }

        let res = match raw_result {
            RawSandboxResult::Success(res) => res,
            RawSandboxResult::Error(e) => bail!("Sandbox failed: {}", e),
        };
        trace!("Sandbox output: {:?}", res);

        let resources = ExecutionResourcesUsage {
            cpu_time_ns: (res.resource_usage.user_cpu_time * 1e9) as u64,
            wall_time_ns: (res.resource_usage.wall_time_usage * 1e9) as u64,
            peak_memory_bytes: res.resource_usage.memory_usage * 1024,
        };

        use tabox::result::ExitStatus::*;
        let (status, exit_code) = match res.status {
            ExitCode(code) => (SandboxStatus::Ok, code),
            Signal(_) | Killed => {
                (classify_kill(&resources, &limits), -1)
            }
        };
        Ok(Outcome {
            status,
            exit_code,
            resources,
        })
    }

    /// Tell the sandbox process to kill the underlying process, making `run` return sooner.
    pub fn kill(&self) {
        let (path, box_pid) = {
            let data = self.data.lock().unwrap();
            (data.path().to_path_buf(), data.box_pid.clone())
        };
        let path = path.display();
        let mut pid = 0;
        // The sandbox may have been created but its process not spawned yet: the PID isn't
        // available right away but will be soon.
        for _ in 0..5 {
            pid = box_pid.load(Ordering::SeqCst);
            if pid != 0 {
                break;
            }
            warn!("Sandbox at {} has no known pid... waiting", path);
            std::thread::sleep(Duration::from_millis(200));
        }
        if pid == 0 {
            warn!("Cannot kill sandbox at {} since the pid is unknown", path);
            return;
        }
        info!("Sandbox at {:?} (pid {}) will be killed", path, pid);
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Cannot kill sandbox at {} (pid {}): {:?}", path, pid, e);
        }
    }

    /// Keep the sandbox directory around after the run, for debugging.
    pub fn keep(&mut self) -> Result<(), Error> {
        let mut data = self.data.lock().unwrap();
        let path = data
            .boxdir
            .as_ref()
            .context("Box dir has gone")?
            .path()
            .to_owned();
        debug!("Keeping sandbox at {:?}", path);
        data.keep_sandbox = true;
        let serialized =
            serde_json::to_string_pretty(&data.params).context("Failed to serialize params")?;
        std::fs::write(path.join("info.json"), serialized)
            .context("Cannot write execution info inside sandbox")?;
        let mut config = SandboxConfiguration::default();
        if self
            .build_command(&path, &data.params, &mut config, data.fifo_dir.clone())
            .is_ok()
        {
            std::fs::write(path.join("tabox.txt"), format!("{:#?}\n", config))
                .context("Cannot write command info inside sandbox")?;
        }
        Ok(())
    }

    /// Host path of the file the sandboxed stdout was redirected to, if any.
    pub fn stdout_path(&self) -> PathBuf {
        let data = self.data.lock().unwrap();
        match &data.params.stdout {
            Redirect::File(path) => data.path().join(BOX_SUBDIR).join(path),
            _ => data.path().join(BOX_SUBDIR).join("stdout"),
        }
    }

    /// Host path of the file the sandboxed stderr was redirected to, if any.
    pub fn stderr_path(&self) -> PathBuf {
        let data = self.data.lock().unwrap();
        match &data.params.stderr {
            Redirect::File(path) => data.path().join(BOX_SUBDIR).join(path),
            _ => data.path().join(BOX_SUBDIR).join("stderr"),
        }
    }

    /// Host path of an output file written by the sandboxed process at `output`, relative to the
    /// sandbox's working directory.
    pub fn output_path(&self, output: &Path) -> PathBuf {
        self.data
            .lock()
            .unwrap()
            .path()
            .join(BOX_SUBDIR)
            .join(output)
    }

    /// Resolve a redirect to the host path `tabox` should open for this fd: a real file for
    /// `File`, `/dev/null` for `Null`, or the `/proc/self/fd/<n>` magic symlink for `InheritedFd`
    /// — cleared of its close-on-exec flag by `run` so it survives into the forked sandbox.
    fn redirect_path(
        &self,
        redirect: &Redirect,
        box_root: &Path,
        boxdir: &Path,
        fifo_dir: Option<&Path>,
    ) -> PathBuf {
        match redirect {
            Redirect::File(path) => self.sandbox_to_host_path(path, box_root, boxdir, fifo_dir),
            Redirect::InheritedFd(fd) => PathBuf::from(format!("/proc/self/fd/{}", fd)),
            Redirect::Null => PathBuf::from("/dev/null"),
        }
    }

    /// Resolve a `Redirect::File` path to its real location on the host: paths under the
    /// sandbox's own working directory (e.g. `/box/message`) land inside this run's scratch
    /// directory; anything else (a real host path a caller already resolved, such as a testcase's
    /// materialized input file living outside the box entirely) is used as-is.
    fn sandbox_to_host_path(
        &self,
        path_in_sandbox: &Path,
        box_root: &Path,
        boxdir: &Path,
        fifo_dir: Option<&Path>,
    ) -> PathBuf {
        if let Some(fifo_dir) = fifo_dir {
            if let Ok(path) = path_in_sandbox.strip_prefix(FIFO_SANDBOX_DIR) {
                return fifo_dir.join(path);
            }
        }
        let relative = path_in_sandbox.strip_prefix(box_root).unwrap_or(path_in_sandbox);
        boxdir.join(BOX_SUBDIR).join(relative)
    }

    /// Build the `tabox` configuration for this run.
    fn build_command(
        &self,
        boxdir: &Path,
        params: &SandboxParams,
        config: &mut SandboxConfiguration,
        fifo_dir: Option<PathBuf>,
    ) -> Result<(), Error> {
        let box_root = &params.working_dir;
        config.working_directory(box_root);
        // the box directory must be writable otherwise output files cannot be written
        config.mount(boxdir.join(BOX_SUBDIR), box_root, true);
        config.env("PATH", std::env::var("PATH").unwrap_or_default());

        config.stdin(self.redirect_path(&params.stdin, box_root, boxdir, fifo_dir.as_deref()));
        config.stdout(self.redirect_path(&params.stdout, box_root, boxdir, fifo_dir.as_deref()));
        config.stderr(self.redirect_path(&params.stderr, box_root, boxdir, fifo_dir.as_deref()));

        for (key, value) in params.env.iter() {
            config.env(key, value);
        }

        if let Some(ms) = params.limits.time_limit_ms {
            let cpu_s = ms as f64 / 1000.0 + EXTRA_TIME_MS as f64 / 1000.0;
            config.time_limit(cpu_s.ceil() as u64);
            let wall_s = (ms as f64 * WALL_TIME_RATIO) / 1000.0 + EXTRA_TIME_MS as f64 / 1000.0;
            config.wall_time_limit(wall_s.ceil() as u64);
        }
        if let Some(mem) = params.limits.memory_limit_bytes {
            config.memory_limit(mem);
        }
        if let Some(stack) = params.limits.effective_stack_limit() {
            config.stack_limit(stack);
        }
        let allow_multiprocess = params.limits.max_processes.map(|n| n > 1).unwrap_or(true);
        // the sandbox's working directory is always writable (outputs must be produced there),
        // so the write syscalls are never blocked at this layer
        config.syscall_filter(SyscallFilter::build(allow_multiprocess, true));

        if let Some(path) = fifo_dir {
            // allow access knowing the path but prevent listing the directory content
            Sandbox::set_permissions(&path, 0o111)
                .with_context(|| format!("Failed to chmod 111 {}", path.display()))?;
            config.mount(path, box_root.join(FIFO_SANDBOX_DIR.trim_start_matches('/')), false);
        }
        for dir in READABLE_DIRS {
            if Path::new(dir).is_dir() {
                config.mount(dir, dir, false);
            }
        }
        for mount in &params.mounts {
            self.install_mount(boxdir, mount, config)?;
        }

        match &params.program {
            Affinity::Executable(path) => {
                if path.is_absolute() {
                    if !path.exists() {
                        bail!("Executable {:?} not found", path);
                    }
                    config.executable(path);
                } else {
                    let host_cmd = boxdir.join(BOX_SUBDIR).join(path);
                    self.validate_local_executable(&host_cmd).with_context(|| {
                        format!(
                            "Local sandbox executable validation failed: {}",
                            host_cmd.display()
                        )
                    })?;
                    config.executable(box_root.join(path));
                }
                for arg in &params.argv {
                    config.arg(arg);
                }
            }
            Affinity::InlineScript(script) => {
                let script_path = boxdir.join(BOX_SUBDIR).join("__run.sh");
                std::fs::write(&script_path, script).context("Failed to write inline script")?;
                Sandbox::set_permissions(&script_path, 0o500)?;
                config.executable(Path::new("/bin/sh"));
                config.arg(box_root.join("__run.sh").to_string_lossy().as_ref());
                for arg in &params.argv {
                    config.arg(arg);
                }
            }
        }

        // drop root privileges in the sandbox
        config.uid(1000);
        config.gid(1000);
        Ok(())
    }

    /// Make `mount.outside` available at `mount.inside` inside the sandbox.
    ///
    /// Directories (e.g. extra readable compiler toolchains) are bind-mounted directly; single
    /// files are hardlinked (falling back to a copy) into the box directory with the tightest
    /// permissions that still allow execution, so the sandboxed process never sees the real host
    /// path nor gets write access it wasn't granted.
    fn install_mount(
        &self,
        boxdir: &Path,
        mount: &BindMount,
        config: &mut SandboxConfiguration,
    ) -> Result<(), Error> {
        if mount.outside.is_dir() {
            config.mount(&mount.outside, &mount.inside, !mount.read_only);
            return Ok(());
        }
        let relative = mount.inside.strip_prefix("/").unwrap_or(&mount.inside);
        let dest = boxdir.join(BOX_SUBDIR).join(relative);
        Sandbox::write_sandbox_file(&dest, &mount.outside, mount.read_only)
    }

    /// Set up the sandbox directory with everything `params` needs present before the run.
    fn setup(box_dir: &Path, params: &SandboxParams) -> Result<(), Error> {
        trace!("Setting up sandbox at {:?}", box_dir);
        Self::create_sandbox_dir(box_dir, BOX_SUBDIR)?;
        Self::create_sandbox_dir(box_dir, "etc")?;
        std::fs::write(
            box_dir.join("etc").join("passwd"),
            "root::0:0::/:/bin/sh\n\
            nobody::1000:1000::/:/bin/sh\n",
        )
        .with_context(|| {
            format!(
                "Failed to write /etc/passwd in the sandbox {}",
                box_dir.display()
            )
        })?;

        if matches!(params.stdout, Redirect::File(_)) {
            Sandbox::touch_file(&box_dir.join(BOX_SUBDIR).join("stdout"), 0o600).ok();
        }
        if matches!(params.stderr, Redirect::File(_)) {
            Sandbox::touch_file(&box_dir.join(BOX_SUBDIR).join("stderr"), 0o600).ok();
        }
        trace!("Sandbox at {:?} ready!", box_dir);
        Ok(())
    }

    fn create_sandbox_dir(box_dir: &Path, path: &str) -> Result<(), Error> {
        let target = box_dir.join(path);
        std::fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create sandbox directory: {}", target.display()))
    }

    /// Put a file inside the sandbox with the most restrictive permissions possible:
    /// `r--------` (0o400) if read-only and not meant to be executed, `r-x------` (0o500)
    /// otherwise (most local executables are installed this way).
    fn write_sandbox_file(dest: &Path, source: &Path, read_only: bool) -> Result<(), Error> {
        std::fs::create_dir_all(dest.parent().context("Invalid destination path")?)
            .with_context(|| format!("Failed to create parent directory of {}", dest.display()))?;
        // Hardlink first: faster, and avoids "text file busy" races with another sandbox copying
        // the same executable concurrently while this one execs it.
        if std::fs::hard_link(source, dest).is_err() {
            std::fs::copy(source, dest).with_context(|| {
                format!("Failed to copy {} -> {}", source.display(), dest.display())
            })?;
        }
        let executable = std::fs::metadata(dest)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
        let mode = match (read_only, executable) {
            (true, true) => 0o500,
            (true, false) => 0o400,
            (false, true) => 0o700,
            (false, false) => 0o600,
        };
        Sandbox::set_permissions(dest, mode)
    }

    fn touch_file(dest: &Path, mode: u32) -> Result<(), Error> {
        std::fs::create_dir_all(dest.parent().context("Invalid file path")?)
            .with_context(|| format!("Failed to create parent directory of {}", dest.display()))?;
        std::fs::File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        Self::set_permissions(dest, mode)
    }

    fn set_permissions(dest: &Path, perm: u32) -> Result<(), Error> {
        std::fs::set_permissions(dest, Permissions::from_mode(perm))
            .with_context(|| format!("Failed to chmod {:03o} {}", perm, dest.display()))
    }

    /// Check that a path is a valid local executable: a regular file in a recognized format.
    fn validate_local_executable(&self, path: &Path) -> Result<(), Error> {
        if !path.is_file() {
            bail!("Executable is not a file");
        }
        let exe = detect_exe(path).context("Failed to detect sandbox executable")?;
        if exe.is_none() {
            bail!("Invalid executable, missing shebang?");
        }
        Ok(())
    }
}

fn clear_cloexec(fd: i32) -> Result<(), nix::Error> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    fcntl(borrowed, FcntlArg::F_SETFD(FdFlag::empty()))?;
    Ok(())
}

fn set_cloexec(fd: i32) -> Result<(), nix::Error> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    fcntl(borrowed, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Guess the classification of a run killed by the sandbox (no exit code available): compare the
/// measured resource usage against what was requested. Falls back to `RuntimeError` for anything
/// that isn't clearly a resource overrun, e.g. a disallowed syscall.
fn classify_kill(
    resources: &ExecutionResourcesUsage,
    limits: &oj_worker_dag::ExecutionLimits,
) -> SandboxStatus {
    if let Some(mem) = limits.memory_limit_bytes {
        if resources.peak_memory_bytes >= mem {
            return SandboxStatus::MemoryLimitExceeded;
        }
    }
    if let Some(ms) = limits.time_limit_ms {
        let limit_ns = ms * 1_000_000;
        if resources.cpu_time_ns >= limit_ns || resources.wall_time_ns >= limit_ns * 2 {
            return SandboxStatus::TimeLimitExceeded;
        }
    }
    SandboxStatus::RuntimeError
}

impl SandboxData {
    fn path(&self) -> &Path {
        // safe: only `Drop` clears `boxdir`
        self.boxdir.as_ref().expect("boxdir is gone").path()
    }
}

impl Drop for SandboxData {
    fn drop(&mut self) {
        if self.keep_sandbox {
            // unwraps the TempDir, dropping the guard without deleting the directory
            self.boxdir.take().map(TempDir::into_path);
        } else if Sandbox::set_permissions(&self.path().join(BOX_SUBDIR), 0o700).is_err() {
            warn!("Cannot 'chmod 700' the sandbox directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use tabox::configuration::{DirectoryMount, SandboxConfiguration};
    use tabox::syscall_filter::SyscallFilterAction;

    use oj_worker_dag::{Affinity, CpuAffinityTarget, ExecutionLimits, SandboxParams};

    use crate::sandbox::Sandbox;
    use crate::ErrorSandboxRunner;

    fn params(program: &str) -> SandboxParams {
        SandboxParams::new(
            Affinity::Executable(PathBuf::from(program)),
            PathBuf::from("/box"),
            CpuAffinityTarget::UserProgram,
        )
    }

    #[test]
    fn test_remove_sandbox_on_drop() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let p = params("/bin/true");
        let sandbox = Sandbox::new(tmpdir.path(), &p, None).unwrap();
        let outfile = sandbox.output_path(Path::new("fooo"));
        if let Err(e) = sandbox.run(&ErrorSandboxRunner::default()) {
            assert!(e.to_string().contains("Nope"));
        } else {
            panic!("Sandbox not called");
        }
        drop(sandbox);
        assert!(!outfile.exists());
        assert!(!outfile.parent().unwrap().exists());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_command_args() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let mut p = params("/bin/sh");
        p.argv = vec!["bar".to_string(), "baz".to_string()];
        p.limits = ExecutionLimits {
            time_limit_ms: Some(1000),
            memory_limit_bytes: Some(1234 * 1024),
            stack_limit_bytes: None,
            max_processes: Some(4),
        };
        p.env.insert("foo".to_string(), "bar".to_string());
        p.mounts.push(oj_worker_dag::BindMount {
            outside: PathBuf::from("/home"),
            inside: PathBuf::from("/home"),
            read_only: true,
        });

        let sandbox = Sandbox::new(tmpdir.path(), &p, None).unwrap();
        let mut config = SandboxConfiguration::default();
        sandbox
            .build_command(tmpdir.path(), &p, &mut config, None)
            .unwrap();
        assert_eq!(config.working_directory, Path::new("/box"));
        assert!(config.time_limit.is_some());
        assert!(config.wall_time_limit.is_some());
        assert_eq!(config.memory_limit, Some(1234 * 1024));
        assert!(config.mount_paths.contains(&DirectoryMount {
            target: "/home".into(),
            source: "/home".into(),
            writable: false
        }));
        let filter = config.syscall_filter.unwrap();
        assert_eq!(filter.default_action, SyscallFilterAction::Allow);
        assert!(config.env.contains(&("foo".to_string(), "bar".to_string())));
        assert_eq!(config.stdin, Some("/dev/null".into()));
        assert_eq!(config.stdout, Some("/dev/null".into()));
        assert_eq!(config.stderr, Some("/dev/null".into()));
        assert_eq!(config.executable, Path::new("/bin/sh"));
        assert_eq!(config.args, vec!["bar", "baz"]);
    }
}
