use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use warden::parse::ProcessConfig;
use warden::registry::ProcessRegistry;
use warden::service::{
    ControlHandle, NoopHooks, RegistryHooks, ServiceControl, ServiceController, ServiceHooks,
    ServiceHost, ServiceState, ServiceStatus, ACCEPT_STOP,
};
use warden::Error;

/// Host double that records every reported status.
#[derive(Default)]
struct RecordingHost {
    reports: Mutex<Vec<ServiceStatus>>,
}

impl RecordingHost {
    fn states(&self) -> Vec<ServiceState> {
        self.reports.lock().unwrap().iter().map(|s| s.state).collect()
    }
}

impl ServiceHost for RecordingHost {
    fn register_control_handler(&self, _handle: ControlHandle) -> Result<(), Error> {
        Ok(())
    }

    fn report_status(&self, _name: &str, status: ServiceStatus) -> Result<(), Error> {
        self.reports.lock().unwrap().push(status);
        Ok(())
    }
}

/// Hooks whose first stop invocation blocks until released, standing in for
/// a purge that takes real time.
struct SlowStopHooks {
    release: Notify,
    first: AtomicBool,
    completions: AtomicUsize,
}

impl SlowStopHooks {
    fn new() -> Self {
        Self {
            release: Notify::new(),
            first: AtomicBool::new(true),
            completions: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ServiceHooks for SlowStopHooks {
    async fn on_stop(&self) {
        if self.first.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

struct FailingHooks;

#[async_trait::async_trait]
impl ServiceHooks for FailingHooks {
    async fn on_start(&self) -> Result<(), Error> {
        Err(anyhow::anyhow!("refused to start").into())
    }
}

#[tokio::test]
async fn stop_control_drives_running_to_stopped() {
    let host = Arc::new(RecordingHost::default());
    let registry = Arc::new(ProcessRegistry::new());
    let hooks = Arc::new(RegistryHooks::new(
        Arc::clone(&registry),
        vec![ProcessConfig {
            command: "sleep 30".to_string(),
            max_retry: 0,
        }],
    ));

    let mut controller = ServiceController::new(
        "test-service",
        Arc::clone(&host) as Arc<dyn ServiceHost>,
        hooks,
    );
    let handle = controller.control_handle();
    let run = tokio::spawn(async move { controller.run().await });

    // Wait until the start hook has populated the registry.
    for _ in 0..100 {
        if handle.state() == ServiceState::Running && registry.len().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.state(), ServiceState::Running);
    assert_eq!(handle.status().accepted_controls, ACCEPT_STOP);

    handle.deliver(ServiceControl::Stop).await;
    // A second stop finds the state already past Running and is ignored.
    handle.deliver(ServiceControl::Stop).await;

    run.await.unwrap().unwrap();

    assert_eq!(handle.state(), ServiceState::Stopped);
    assert!(registry.is_empty().await);

    assert_eq!(
        host.states(),
        vec![
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::StopPending,
            ServiceState::Stopped,
        ]
    );

    let checkpoints: Vec<u32> = host
        .reports
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.checkpoint)
        .collect();
    assert!(checkpoints.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn stopped_is_not_reported_while_stop_hook_is_in_flight() {
    let host = Arc::new(RecordingHost::default());
    let hooks = Arc::new(SlowStopHooks::new());

    let mut controller = ServiceController::new(
        "test-service",
        Arc::clone(&host) as Arc<dyn ServiceHost>,
        Arc::clone(&hooks) as Arc<dyn ServiceHooks>,
    );
    let handle = controller.control_handle();
    let run = tokio::spawn(async move { controller.run().await });

    for _ in 0..100 {
        if handle.state() == ServiceState::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.state(), ServiceState::Running);

    // The control callback's stop work blocks; the lifecycle must keep
    // waiting until it has finished.
    let deliver_handle = handle.clone();
    let deliver =
        tokio::spawn(async move { deliver_handle.deliver(ServiceControl::Stop).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!run.is_finished());
    assert_eq!(handle.state(), ServiceState::StopPending);
    assert!(!host.states().contains(&ServiceState::Stopped));
    assert_eq!(hooks.completions.load(Ordering::SeqCst), 0);

    hooks.release.notify_one();
    deliver.await.unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handle.state(), ServiceState::Stopped);
    // Once from the callback, once from the lifecycle path.
    assert_eq!(hooks.completions.load(Ordering::SeqCst), 2);
    assert_eq!(host.states().last(), Some(&ServiceState::Stopped));
}

#[tokio::test]
async fn failed_start_hook_still_reaches_stopped() {
    let host = Arc::new(RecordingHost::default());
    let mut controller = ServiceController::new(
        "test-service",
        Arc::clone(&host) as Arc<dyn ServiceHost>,
        Arc::new(FailingHooks),
    );

    controller.run().await.unwrap();

    assert_eq!(
        host.states(),
        vec![
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::StopPending,
            ServiceState::Stopped,
        ]
    );
}

#[tokio::test]
async fn stop_control_is_ignored_before_running() {
    let host = Arc::new(RecordingHost::default());
    let controller = ServiceController::new(
        "test-service",
        Arc::clone(&host) as Arc<dyn ServiceHost>,
        Arc::new(NoopHooks),
    );
    let handle = controller.control_handle();

    handle.deliver(ServiceControl::Stop).await;

    assert_eq!(handle.state(), ServiceState::NotStarted);
    assert!(host.states().is_empty());
}
