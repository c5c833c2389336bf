use std::io;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::parse::ProcessConfig;
use crate::task::TaskSlot;

/// Exit code reported when the watcher had to force-kill its child.
pub const EXIT_FORCED: u32 = 0;
/// Exit code the watch task finishes with when the spawn itself failed.
pub const EXIT_SPAWN_FAILED: u32 = 1;

/// One managed child process: spawns it, waits for natural exit or a stop
/// request, force-terminates it on stop, and reports the exit code.
#[derive(Default)]
pub struct ProcessWatcher {
    task: TaskSlot,
    stop: Option<CancellationToken>,
    config: Option<ProcessConfig>,
    pid: Option<u32>,
    exit_code: Option<u32>,
}

impl ProcessWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the configured command and its watch task.
    ///
    /// Stops any previous run first, so a watcher may be restarted. Does not
    /// return until the spawn outcome is known: the watch task reports
    /// success or failure over a one-shot rendezvous channel. On failure no
    /// watch task remains running and the error is returned synchronously.
    pub async fn start(&mut self, config: ProcessConfig) -> Result<(), Error> {
        self.stop().await;

        let stop = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        self.task.start(watch(config.clone(), stop.clone(), ready_tx))?;

        match ready_rx.await {
            Ok(Ok(pid)) => {
                self.stop = Some(stop);
                self.config = Some(config);
                self.pid = Some(pid);
                self.exit_code = None;
                Ok(())
            }
            Ok(Err(err)) => {
                self.exit_code = self.task.join().await;
                Err(err)
            }
            Err(_) => {
                // The watch task went away before reporting its outcome.
                self.exit_code = self.task.join().await;
                Err(Error::Spawn {
                    command: config.command,
                    source: io::Error::other("watch task exited before reporting spawn outcome"),
                })
            }
        }
    }

    /// Signals the watch task and waits for it to finish, blocking until the
    /// child has been terminated or had already exited.
    ///
    /// Returns the exit code of this run, or `None` when nothing was started.
    /// Idempotent.
    pub async fn stop(&mut self) -> Option<u32> {
        let stop = self.stop.take()?;
        stop.cancel();
        let code = self.task.join().await;
        self.exit_code = code;
        self.pid = None;
        code
    }

    /// Liveness straight from the OS: probes the child PID with signal 0,
    /// not the watch task.
    pub fn is_running(&self) -> bool {
        match self.pid {
            Some(pid) => signal::kill(Pid::from_raw(pid as i32), None).is_ok(),
            None => false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Last observed exit code, available once the run has been stopped or
    /// joined.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn config(&self) -> Option<&ProcessConfig> {
        self.config.as_ref()
    }
}

impl Drop for ProcessWatcher {
    fn drop(&mut self) {
        // The registry stops watchers before releasing them; this path covers
        // a watcher dropped while its child is still alive. Aborting the
        // watch task drops the child handle, and kill_on_drop has the runtime
        // kill and reap it: no orphans, no zombies.
        if let Some(stop) = &self.stop {
            stop.cancel();
        }
        if self.task.is_alive() {
            warn!(pid = self.pid, "watcher dropped while running, killing child");
            self.task.kill();
        }
    }
}

/// Watch-task body: one spawn, then a single infinite wait on either child
/// exit or the stop token.
async fn watch(
    config: ProcessConfig,
    stop: CancellationToken,
    ready: oneshot::Sender<Result<u32, Error>>,
) -> u32 {
    info!(command = %config.command, "starting child");
    let mut child = match spawn_child(&config.command) {
        Ok(child) => child,
        Err(err) => {
            error!(command = %config.command, error = %err, "spawn failed");
            let _ = ready.send(Err(err));
            return EXIT_SPAWN_FAILED;
        }
    };

    let pid = child.id().unwrap_or(0);
    info!(pid, "child started");
    let _ = ready.send(Ok(pid));

    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_code_of(status),
            Err(err) => {
                warn!(pid, error = %err, "wait on child failed");
                EXIT_FORCED
            }
        },
        _ = stop.cancelled() => {
            // Stop requested; the child may have exited on its own already.
            match child.try_wait() {
                Ok(Some(status)) => exit_code_of(status),
                _ => {
                    info!(pid, "stop requested, killing child");
                    if let Err(err) = child.kill().await {
                        warn!(pid, error = %err, "kill failed");
                    }
                    EXIT_FORCED
                }
            }
        }
    };

    info!(pid, code, "child exited");
    code
}

fn spawn_child(command: &str) -> Result<Child, Error> {
    let words = shell_words::split(command).map_err(|err| Error::Spawn {
        command: command.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, err),
    })?;
    let (program, args) = words.split_first().ok_or_else(|| Error::Spawn {
        command: command.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
    })?;

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // If the watch task is ever dropped instead of joined, the runtime
        // kills and reaps the child.
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            command: command.to_string(),
            source,
        })
}

fn exit_code_of(status: ExitStatus) -> u32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code as u32,
        None => 128 + status.signal().unwrap_or(0) as u32,
    }
}
