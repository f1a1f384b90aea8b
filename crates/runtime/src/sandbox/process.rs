//! Supervised child processes
//!
//! Spawns one child per run with a scrubbed environment, its own process
//! group, kernel resource limits, a stdin payload, bounded output capture, a
//! wall-clock deadline and a peak-memory sampler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Pid, System};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration};

use crate::types::SandboxError;

/// Path handed to children that do not inherit the host PATH
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// How often the memory sampler polls the child
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// How long output readers may keep draining after the child is gone
const READER_GRACE: Duration = Duration::from_secs(2);

/// Kernel limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlimitPlan {
    pub address_space_bytes: Option<u64>,
    pub cpu_seconds: Option<u64>,
    pub file_size_bytes: Option<u64>,
    pub open_files: Option<u64>,
}

/// Everything needed to launch one supervised child
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Complete child environment; nothing is inherited from the host
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
    pub rlimits: RlimitPlan,
    pub wall_timeout: Duration,
    pub max_output_bytes: usize,
}

/// What happened to a supervised child
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
    pub peak_memory_bytes: Option<u64>,
}

/// Minimal deterministic environment for a child rooted at `home`
pub fn base_environment(home: &Path, inherit_path: bool) -> HashMap<String, String> {
    let path = if inherit_path {
        std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string())
    } else {
        DEFAULT_PATH.to_string()
    };

    let home = home.display().to_string();
    let mut env = HashMap::new();
    env.insert("PATH".to_string(), path);
    env.insert("HOME".to_string(), home.clone());
    env.insert("TMPDIR".to_string(), home);
    env.insert("LANG".to_string(), "C.UTF-8".to_string());
    env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
    env.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
    env.insert("PYTHONHASHSEED".to_string(), "0".to_string());
    env
}

/// Locate an executable by name on PATH, or check an explicit path
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Run a child to completion or until its wall-clock deadline passes
pub async fn run_supervised(spec: &ProcessSpec) -> Result<ProcessOutcome, SandboxError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .env_clear()
        .envs(&spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    apply_resource_limits(&mut command, spec.rlimits);

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| SandboxError::Spawn {
        program: spec.program.display().to_string(),
        reason: e.to_string(),
    })?;

    if let (Some(mut stdin), Some(payload)) = (child.stdin.take(), spec.stdin.clone()) {
        tokio::spawn(async move {
            // the child may exit without reading; a broken pipe is not an error here
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::trace!("stdin write ended early: {}", e);
            }
            let _ = stdin.shutdown().await;
        });
    }

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(read_limited(out, spec.max_output_bytes)));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(read_limited(err, spec.max_output_bytes)));

    let stop_sampler = Arc::new(AtomicBool::new(false));
    let sampler = child
        .id()
        .map(|pid| spawn_memory_sampler(pid, stop_sampler.clone()));

    let waited = timeout(spec.wall_timeout, child.wait()).await;
    let (status, timed_out) = match waited {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(e)) => {
            stop_sampler.store(true, Ordering::Relaxed);
            kill_process_group(&mut child).await;
            return Err(SandboxError::Wait(e.to_string()));
        }
        Err(_) => {
            tracing::warn!(
                "Child '{}' exceeded wall-clock timeout of {:?}, killing process group",
                spec.program.display(),
                spec.wall_timeout
            );
            kill_process_group(&mut child).await;
            (child.wait().await.ok(), true)
        }
    };
    let duration = start.elapsed();

    stop_sampler.store(true, Ordering::Relaxed);
    let peak_memory_bytes = match sampler {
        Some(handle) => handle.await.ok().filter(|peak| *peak > 0),
        None => None,
    };

    let (stdout, stdout_truncated) = collect_stream(stdout_task).await;
    let (stderr, stderr_truncated) = collect_stream(stderr_task).await;

    if stdout_truncated {
        tracing::warn!("stdout truncated at {} bytes", spec.max_output_bytes);
    }
    if stderr_truncated {
        tracing::warn!("stderr truncated at {} bytes", spec.max_output_bytes);
    }

    let (exit_code, signal) = match status {
        Some(status) => (status.code(), exit_signal(&status)),
        None => (None, None),
    };

    tracing::debug!(
        "Child '{}' finished: exit_code={:?}, signal={:?}, timed_out={}, duration={:?}",
        spec.program.display(),
        exit_code,
        signal,
        timed_out,
        duration
    );

    Ok(ProcessOutcome {
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        exit_code,
        signal,
        timed_out,
        duration,
        peak_memory_bytes,
    })
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// New process group plus kernel limits, applied in the child before exec
#[cfg(unix)]
fn apply_resource_limits(command: &mut Command, plan: RlimitPlan) {
    // SAFETY: pre_exec runs between fork() and exec() in the child process.
    // setpgid and setrlimit are async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            libc::setpgid(0, 0);

            rlimit::setrlimit(rlimit::Resource::CORE, 0, 0)
                .map_err(|e| std::io::Error::other(format!("Failed to set RLIMIT_CORE: {}", e)))?;

            if let Some(bytes) = plan.address_space_bytes {
                rlimit::setrlimit(rlimit::Resource::AS, bytes, bytes).map_err(|e| {
                    std::io::Error::other(format!("Failed to set RLIMIT_AS: {}", e))
                })?;
            }
            if let Some(seconds) = plan.cpu_seconds {
                // hard one second above soft so SIGXCPU lands before SIGKILL
                rlimit::setrlimit(rlimit::Resource::CPU, seconds, seconds.saturating_add(1))
                    .map_err(|e| {
                        std::io::Error::other(format!("Failed to set RLIMIT_CPU: {}", e))
                    })?;
            }
            if let Some(bytes) = plan.file_size_bytes {
                rlimit::setrlimit(rlimit::Resource::FSIZE, bytes, bytes).map_err(|e| {
                    std::io::Error::other(format!("Failed to set RLIMIT_FSIZE: {}", e))
                })?;
            }
            if let Some(count) = plan.open_files {
                rlimit::setrlimit(rlimit::Resource::NOFILE, count, count).map_err(|e| {
                    std::io::Error::other(format!("Failed to set RLIMIT_NOFILE: {}", e))
                })?;
            }

            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_resource_limits(_command: &mut Command, plan: RlimitPlan) {
    if plan != RlimitPlan::default() {
        tracing::warn!("Resource limits are not supported on this platform, ignoring them");
    }
}

async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(id) = child.id() {
            unsafe {
                libc::killpg(id as i32, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

fn spawn_memory_sampler(pid: u32, stop: Arc<AtomicBool>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut system = System::new();
        let pid = Pid::from(pid as usize);
        let mut peak = 0u64;
        let mut ticker = interval(MEMORY_SAMPLE_INTERVAL);

        loop {
            ticker.tick().await;
            if stop.load(Ordering::Relaxed) || !system.refresh_process(pid) {
                break;
            }
            match system.process(pid) {
                Some(process) => peak = peak.max(process.memory()),
                None => break,
            }
        }

        peak
    })
}

async fn collect_stream(task: Option<JoinHandle<(String, bool)>>) -> (String, bool) {
    let Some(mut handle) = task else {
        return (String::new(), false);
    };
    match timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            tracing::debug!("Output reader failed: {}", e);
            (String::new(), false)
        }
        Err(_) => {
            // a stray grandchild still holds the pipe open
            handle.abort();
            (String::new(), false)
        }
    }
}

/// Read a stream to its end, keeping at most `max_bytes` and draining the rest
async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> (String, bool) {
    let mut kept = Vec::with_capacity(max_bytes.min(64 * 1024));
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(kept.len());
                if room >= n {
                    kept.extend_from_slice(&chunk[..n]);
                } else {
                    kept.extend_from_slice(&chunk[..room]);
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }

    let output = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        (
            format!("{}\n... [output truncated at {} bytes]", output, max_bytes),
            true,
        )
    } else {
        (output, false)
    }
}
