use std::env;
use std::sync::Arc;

use anyhow::Result;

use warden::logger::logs_tracing;
use warden::parse::parser;
use warden::registry::ProcessRegistry;
use warden::service::{RegistryHooks, ServiceController, SignalHost};
use warden::shell::run_console;

const CONFIG_PATH: &str = "config/config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version") {
        println!("warden {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = parser(CONFIG_PATH)?;
    let _guard = logs_tracing();
    let registry = Arc::new(ProcessRegistry::new());

    // Console mode: run the process list without the service host (debug aid).
    if args.iter().any(|a| a == "--console") {
        println!("warden console. service name: `{}`", config.service_name);
        for process in &config.processes {
            if let Err(err) = registry.add_entry(process.clone()).await {
                eprintln!("failed to start `{}`: {}", process.command, err);
            }
        }
        run_console(registry).await?;
        return Ok(());
    }

    let hooks = Arc::new(RegistryHooks::new(
        Arc::clone(&registry),
        config.processes.clone(),
    ));
    let mut controller =
        ServiceController::new(config.service_name.clone(), Arc::new(SignalHost), hooks);
    controller.run().await?;
    Ok(())
}
