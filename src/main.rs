use std::{sync::Arc, thread};

use colored::Colorize;
use log::{debug, error, info};
use thiserror::Error;
use tokio::runtime::{self, Runtime};
use wheelsync_collab::{Collab, Config, ConfigError};
use wheelsync_core::{MemoryStore, SystemClock};
use wheelsync_server::{ServerCollab, ServerContext, StartupError};

mod logging;

pub struct Wheelsync {
    collab: Arc<ServerCollab>,
    context: ServerContext,
    port: u16,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum WheelsyncError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not build async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("{0}")]
    Startup(#[from] StartupError),
}

impl Wheelsync {
    fn new() -> Result<Self, WheelsyncError> {
        let config = Config::from_env()?;
        let port = wheelsync_server::port_from_env()?;

        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("wheelsync-async")
            .build()?;

        let collab = Arc::new(Collab::new(MemoryStore::new(), Arc::new(SystemClock), config));
        let context = ServerContext::new(collab.clone());

        Ok(Self {
            collab,
            context,
            port,
            runtime,
        })
    }

    fn run(self) -> Result<(), WheelsyncError> {
        let collab = self.collab.clone();
        let sse = self.context.sse.clone();

        thread::spawn(move || {
            while let Ok(event) = collab.events().recv() {
                debug!("{:?}", event);
                sse.broadcast(event.into());
            }
        });

        self.runtime.block_on(async {
            self.collab.start();
            wheelsync_server::run_server(self.context.clone(), self.port).await
        })?;

        Ok(())
    }
}

impl WheelsyncError {
    fn hint(&self) -> String {
        match self {
            WheelsyncError::Config(_) => "Check the WHEELSYNC_* environment variables, each one takes a whole number in the unit its name ends with.".to_string(),
            WheelsyncError::Runtime(_) => "This error is fatal, and should not happen.".to_string(),
            WheelsyncError::Startup(StartupError::InvalidPort(_)) => "WHEELSYNC_SERVER_PORT must be between 0 and 65535.".to_string(),
            WheelsyncError::Startup(_) => "Make sure no other program is using the port, or pick another one with WHEELSYNC_SERVER_PORT.".to_string(),
        }
    }
}

fn main() {
    if let Err(error) = logging::init_logger() {
        eprintln!("Could not initialize logging: {}", error);
    }

    let result = Wheelsync::new().and_then(|wheelsync| {
        info!("Initialized successfully.");
        wheelsync.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "wheelsync failed to start!".bold().red());
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).bright_black().italic()
        );
    }
}
