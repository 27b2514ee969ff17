// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `unitd`: runs one unit agent and serves its command socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod env;
mod exit;
mod lifecycle;
mod listener;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use ua_adapters::{HttpSource, LocalModel, ProcessRunner};
use ua_core::SystemClock;
use ua_engine::{
    command_bridge, Agent, AgentConfig, AgentDeps, AgentError, ArchiveDeployer, TaskError,
    TaskGroup,
};

use crate::exit::{exit_code, EXIT_FATAL};
use crate::lifecycle::{Config, StartupResult};
use crate::listener::{ListenCtx, Listener};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("unitd: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };
    let _guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("unitd: failed to open log {}: {e}", config.log_path.display());
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let StartupResult { daemon, listener } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(e) => {
            error!("startup failed: {}", e);
            eprintln!("unitd: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let code = serve(&daemon.config, listener).await;
    daemon.shutdown();
    info!(code, "unitd exiting");
    ExitCode::from(code)
}

fn setup_logging(config: &Config) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.settings.data_dir)?;
    let appender = tracing_appender::rolling::never(&config.settings.data_dir, "unitd.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = env::log_filter()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
    Ok(guard)
}

/// Run the agent, the listener and the stop watcher until one of them ends.
async fn serve(config: &Config, unix: UnixListener) -> u8 {
    let settings = &config.settings;
    let root = CancellationToken::new();
    let mut group = TaskGroup::<AgentError>::new(&root);
    let token = group.token();

    let model = match LocalModel::start(
        &settings.model_path,
        &config.status_path,
        settings.unit.clone(),
        settings.model_poll,
        token.child_token(),
    ) {
        Ok(model) => model,
        Err(e) => {
            error!(model = %settings.model_path.display(), "failed to load model: {}", e);
            return setup_failed("model", e.into());
        }
    };

    let (bridge, inbox) = command_bridge(token.clone());
    let mut agent_config = AgentConfig::new(settings.unit.clone());
    agent_config.lock_name = settings.lock_name.clone();
    agent_config.lock_delay = settings.lock_delay;
    agent_config.update_status_period = settings.update_status_period;
    agent_config.collect_metrics_period = settings.collect_metrics_period;
    agent_config.hook_env = settings.hook_env.clone();

    let deps = AgentDeps {
        facade: model.clone(),
        leadership: model,
        runner: ProcessRunner::new(),
        source: HttpSource::new(),
        deployer: ArchiveDeployer::new(&config.charm_dir, &config.deployer_dir),
        clock: SystemClock,
    };
    let agent = match Agent::new(deps, &config.agent_paths(), agent_config, inbox, token.clone())
    {
        Ok(agent) => agent,
        Err(e) => {
            error!("failed to create agent: {}", e);
            return setup_failed("agent", e);
        }
    };

    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        unit: settings.unit.clone(),
        bridge,
        status: agent.subscribe(),
        shutdown: Arc::clone(&shutdown),
        ipc_timeout: settings.ipc_timeout,
    });

    group.spawn("agent", agent.run());
    let listener = Listener::new(unix, ctx);
    let listen_token = token.clone();
    group.spawn("listener", async move {
        listener.run(listen_token).await;
        Ok(())
    });
    group.spawn("signals", async move {
        wait_for_stop(&shutdown, &token).await;
        Ok(())
    });

    let result = group.wait().await;
    if let Err(e) = &result {
        info!("stopped: {}", e);
    }
    exit_code(&result)
}

fn setup_failed(name: &'static str, error: AgentError) -> u8 {
    exit_code(&Err(TaskError::Failed { name, error }))
}

/// Returns on SIGINT, SIGTERM, a `Shutdown` request, or group cancellation.
async fn wait_for_stop(shutdown: &Notify, cancel: &CancellationToken) {
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
        _ = shutdown.notified() => info!("shutdown requested"),
        _ = cancel.cancelled() => {}
    }
}
