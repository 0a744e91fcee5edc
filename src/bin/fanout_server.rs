//! `fanout-server` — Program B: ring-to-TCP fan-out server CLI (§6).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use seismux::fanout::{
    CancellationToken, Listener, NullRingSource, NullTermination, RingReader, ServerConfig,
    Supervisor, SupervisorConfig, SubscriberTable, DEFAULT_MAX_CONNECT_USERS,
};

/// Run the ring-to-TCP fan-out server from a config file.
#[derive(Parser, Debug)]
#[command(name = "fanout-server", version, about)]
struct Opt {
    /// Config file (see §6's key table).
    config_file: PathBuf,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    stderrlog::new()
        .module(module_path!())
        .module("seismux")
        .quiet(false)
        .verbosity(1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let cfg = ServerConfig::load(&opt.config_file)
        .with_context(|| format!("loading {}", opt.config_file.display()))?;

    info!(
        "fanout-server: {} binding {}:{}, in-ring {:?}",
        cfg.module_id, cfg.host, cfg.port, cfg.in_ring
    );

    let table = Arc::new(Mutex::new(SubscriberTable::new(DEFAULT_MAX_CONNECT_USERS)));
    let cancel = CancellationToken::new();
    let self_pid = std::process::id();

    if cfg.control_c_exit {
        let cancel_for_handler = cancel.clone();
        ctrlc::set_handler(move || {
            info!("fanout-server: SIGINT received, requesting shutdown");
            cancel_for_handler.cancel();
        })
        .context("installing SIGINT handler")?;
    }

    let listener = Listener::bind(
        &cfg.host,
        cfg.port,
        table.clone(),
        cancel.clone(),
        cfg.channels.clone(),
        cfg.sample_rate,
        cfg.board_type,
    )
    .with_context(|| format!("binding {}:{}", cfg.host, cfg.port))?;

    // The ring buffer itself is an external collaborator (§1); until this
    // deployment is wired to a concrete shared-memory binding, the reader
    // runs over a source that never produces data.
    let reader = RingReader::new(NullRingSource, table.clone(), cancel.clone(), self_pid);

    let listener_handle = std::thread::Builder::new()
        .name("listener".to_string())
        .spawn(move || listener.run())
        .context("spawning listener thread")?;
    let reader_handle = std::thread::Builder::new()
        .name("ring-reader".to_string())
        .spawn(move || reader.run())
        .context("spawning ring-reader thread")?;

    let supervisor_config = SupervisorConfig {
        heartbeat_interval: cfg.heartbeat_interval,
        refresh_interval: cfg.refresh_interval,
        check_stdin: cfg.check_stdin,
    };
    let supervisor = Supervisor::new(table, cancel, supervisor_config, NullTermination, self_pid);
    supervisor.run(vec![listener_handle, reader_handle]);

    info!("fanout-server: exiting");
    Ok(())
}
