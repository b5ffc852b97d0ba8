mod cli;
mod error_fmt;
mod logging;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use dpdce_config::Config;
use dpdce_core::rpc::UdpTransport;
use dpdce_core::{
    Collaborators, Engine, EngineParams, LinearSchedule, ProtocolServer, Settings,
    current_settings, reset_to_defaults,
};
use dpdce_sim::{BinStatFactory, PolyModel, SimAgc, SimTransmitter};
use dpdce_traits::SystemClock;
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = dpdce_config::load_file(&cli.config)?;
    let _log_guard =
        logging::init(&cli.log_level, cli.json, &cfg.logging, &cfg.paths.logs_directory)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let tx = SimTransmitter::new(cfg.sim, cfg.transmitter.samps, cfg.transmitter.samplerate);
    match cli.cmd {
        Commands::Serve => serve(&cfg, tx),
        Commands::Status => {
            let settings = current_settings(&mut tx.clone())?;
            print_settings(&settings, cli.json)
        }
        Commands::Reset => {
            let mut adapt = tx.clone();
            reset_to_defaults(&mut adapt, &mut PolyModel::default())?;
            let settings = current_settings(&mut adapt)?;
            if !cli.json {
                println!("Transmitter reset to defaults");
            }
            print_settings(&settings, cli.json)
        }
    }
}

fn print_settings(s: &Settings, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string(s)?);
    } else {
        println!("tx_gain: {}", s.tx_gain);
        println!("rx_gain: {}", s.rx_gain);
        println!("digital_gain: {}", s.digital_gain);
        println!("{}", s.predistorter);
    }
    Ok(())
}

fn sim_collaborators(cfg: &Config, tx: &SimTransmitter) -> Collaborators {
    Collaborators {
        measure: Box::new(tx.measure()),
        stats: Box::new(BinStatFactory {
            n_bins: cfg.sim.n_bins,
        }),
        model: Box::new(PolyModel::default()),
        adapt: Box::new(tx.clone()),
        agc: Box::new(SimAgc::new(tx.clone(), cfg.sim.target_rx_median)),
        heuristics: Box::new(LinearSchedule::from(&cfg.schedule)),
    }
}

fn serve(cfg: &Config, tx: SimTransmitter) -> eyre::Result<()> {
    let engine = Engine::start(
        sim_collaborators(cfg, &tx),
        EngineParams::from(cfg),
        Box::new(SystemClock),
    )?;

    let addr = (cfg.control.bind.as_str(), cfg.control.port);
    let transport = UdpTransport::bind(addr, Duration::from_millis(cfg.control.poll_timeout_ms))
        .wrap_err_with(|| format!("bind control socket {}:{}", addr.0, addr.1))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    tracing::info!(bind = %cfg.control.bind, port = cfg.control.port, "listening");
    let mut server = ProtocolServer::new(transport, engine.shared(), engine.commands());
    let served = server.serve(&shutdown);
    engine.shutdown();
    tracing::info!("engine stopped");
    served
}
