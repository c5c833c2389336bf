use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::parse::ProcessConfig;
use crate::registry::ProcessRegistry;
use crate::task::TaskSlot;

/// Accepted-controls bit: the host may deliver a stop control.
pub const ACCEPT_STOP: u32 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    StartPending,
    Running,
    StopPending,
    Stopped,
}

/// Mirrored to the host on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepted_controls: u32,
    pub exit_code: u32,
    /// Monotonic per-transition counter.
    pub checkpoint: u32,
}

impl ServiceStatus {
    fn new() -> Self {
        Self {
            state: ServiceState::NotStarted,
            accepted_controls: 0,
            exit_code: 0,
            checkpoint: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceControl {
    Stop,
}

/// The host's service-control surface.
///
/// `register_control_handler` hands the host a typed [`ControlHandle`] bound
/// at registration time, so the callback path never carries an opaque
/// context pointer. Both operations may fail without consequence beyond a
/// warning: the service keeps running with degraded observability.
pub trait ServiceHost: Send + Sync {
    fn register_control_handler(&self, handle: ControlHandle) -> Result<(), Error>;
    fn report_status(&self, name: &str, status: ServiceStatus) -> Result<(), Error>;
}

/// The two lifecycle extension points, injected rather than inherited.
///
/// `on_stop` may run from both the control-callback path and the lifecycle
/// path, so it must tolerate being invoked more than once.
#[async_trait]
pub trait ServiceHooks: Send + Sync {
    async fn on_start(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn on_stop(&self) {}
}

/// Default no-op hook set.
pub struct NoopHooks;

#[async_trait]
impl ServiceHooks for NoopHooks {}

/// Hooks that drive a process registry from the configured command list:
/// populate on start, purge on stop.
pub struct RegistryHooks {
    registry: Arc<ProcessRegistry>,
    processes: Vec<ProcessConfig>,
}

impl RegistryHooks {
    pub fn new(registry: Arc<ProcessRegistry>, processes: Vec<ProcessConfig>) -> Self {
        Self { registry, processes }
    }
}

#[async_trait]
impl ServiceHooks for RegistryHooks {
    async fn on_start(&self) -> Result<(), Error> {
        for config in &self.processes {
            // A refused spawn is logged and skipped, never fatal.
            if let Err(err) = self.registry.add_entry(config.clone()).await {
                warn!(command = %config.command, error = %err, "skipping process entry");
            }
        }
        info!("service started");
        Ok(())
    }

    async fn on_stop(&self) {
        info!("service stopping");
        self.registry.purge_all().await;
    }
}

/// State shared between the controller and its control handle.
struct Lifecycle {
    name: String,
    status: Mutex<ServiceStatus>,
    stop: CancellationToken,
    host: Arc<dyn ServiceHost>,
    hooks: Arc<dyn ServiceHooks>,
}

impl Lifecycle {
    fn lock_status(&self) -> MutexGuard<'_, ServiceStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advances the status record unconditionally and mirrors it to the host.
    fn transition(&self, state: ServiceState, accepted_controls: u32) {
        let status = {
            let mut status = self.lock_status();
            status.state = state;
            status.accepted_controls = accepted_controls;
            status.checkpoint += 1;
            *status
        };
        self.report(status);
    }

    /// Advances the status record only when the current state is `from`.
    /// Returns whether the transition happened. The check and the mutation
    /// share one lock acquisition, so concurrent control deliveries cannot
    /// both win.
    fn transition_if(&self, from: ServiceState, state: ServiceState, accepted_controls: u32) -> bool {
        let status = {
            let mut status = self.lock_status();
            if status.state != from {
                return false;
            }
            status.state = state;
            status.accepted_controls = accepted_controls;
            status.checkpoint += 1;
            *status
        };
        self.report(status);
        true
    }

    fn report(&self, status: ServiceStatus) {
        info!(state = ?status.state, checkpoint = status.checkpoint, "service transition");
        if let Err(err) = self.host.report_status(&self.name, status) {
            warn!(error = %err, "status report failed");
        }
    }
}

/// Cloneable, typed handle the host callback uses to deliver controls.
#[derive(Clone)]
pub struct ControlHandle {
    lifecycle: Arc<Lifecycle>,
}

impl ControlHandle {
    /// Delivers a control code. A stop control is honored only while the
    /// service is `Running`: the status moves to `StopPending`, the stop hook
    /// runs to completion, and only then is the stop token cancelled (which
    /// unblocks the lifecycle's wait task). The hook's stop work therefore
    /// always finishes before `Stopped` can be reported. In any other state
    /// the control is ignored.
    pub async fn deliver(&self, control: ServiceControl) {
        match control {
            ServiceControl::Stop => {
                if !self
                    .lifecycle
                    .transition_if(ServiceState::Running, ServiceState::StopPending, 0)
                {
                    return;
                }
                info!("stop control accepted");
                self.lifecycle.hooks.on_stop().await;
                self.lifecycle.stop.cancel();
            }
        }
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.lock_status().state
    }

    pub fn status(&self) -> ServiceStatus {
        *self.lifecycle.lock_status()
    }
}

/// The service lifecycle state machine
/// (`StartPending -> Running -> StopPending -> Stopped`).
/// Exactly one instance exists per process execution.
pub struct ServiceController {
    lifecycle: Arc<Lifecycle>,
    task: TaskSlot,
}

impl ServiceController {
    pub fn new(
        name: impl Into<String>,
        host: Arc<dyn ServiceHost>,
        hooks: Arc<dyn ServiceHooks>,
    ) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle {
                name: name.into(),
                status: Mutex::new(ServiceStatus::new()),
                stop: CancellationToken::new(),
                host,
                hooks,
            }),
            task: TaskSlot::new(),
        }
    }

    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// Drives the whole lifecycle: register the control handler, report
    /// `StartPending` then `Running`, run the start hook, block on the stop
    /// token, run the stop hook, report `Stopped`.
    pub async fn run(&mut self) -> Result<(), Error> {
        let lifecycle = Arc::clone(&self.lifecycle);

        if let Err(err) = lifecycle.host.register_control_handler(self.control_handle()) {
            // Degraded: controls can still arrive through existing handles.
            warn!(error = %err, "control handler registration failed");
        }

        lifecycle.transition(ServiceState::StartPending, 0);
        lifecycle.transition(ServiceState::Running, ACCEPT_STOP);

        match lifecycle.hooks.on_start().await {
            Ok(()) => {
                let stop = lifecycle.stop.clone();
                self.task.start(async move {
                    stop.cancelled().await;
                    0
                })?;
                self.task.join().await;
            }
            Err(err) => {
                error!(error = %err, "start hook failed, stopping");
                lifecycle.transition_if(ServiceState::Running, ServiceState::StopPending, 0);
            }
        }

        // The stop hook runs unconditionally, and the token is re-signalled
        // afterwards; both are idempotent, so it does not matter whether the
        // control callback already did either.
        lifecycle.hooks.on_stop().await;
        lifecycle.stop.cancel();
        lifecycle.transition(ServiceState::Stopped, 0);
        Ok(())
    }
}

/// Host backed by Unix signals: SIGTERM and SIGINT are the stop control, and
/// status transitions are mirrored into the log.
pub struct SignalHost;

impl ServiceHost for SignalHost {
    fn register_control_handler(&self, handle: ControlHandle) -> Result<(), Error> {
        let mut signals =
            Signals::new([SIGTERM, SIGINT]).map_err(|err| Error::HostRegistration(err.to_string()))?;
        tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                info!(signal, "stop signal received");
                handle.deliver(ServiceControl::Stop).await;
            }
        });
        Ok(())
    }

    fn report_status(&self, name: &str, status: ServiceStatus) -> Result<(), Error> {
        info!(
            service = name,
            state = ?status.state,
            accepted_controls = status.accepted_controls,
            checkpoint = status.checkpoint,
            "status reported"
        );
        Ok(())
    }
}
