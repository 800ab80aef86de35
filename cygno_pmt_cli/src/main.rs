use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use libcygno_pmt::config::Config;
use libcygno_pmt::process::{create_subsets, process_subset};
use libcygno_pmt::worker_status::WorkerStatus;

/// Log to ./cygno_pmt.log in addition to the terminal
fn init_logging() -> spdlog::Result<()> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./cygno_pmt.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let mut builder = spdlog::Logger::builder();
    for sink in spdlog::default_logger().sinks() {
        builder.sink(sink.clone());
    }
    let logger = Arc::new(
        builder
            .sink(file_sink)
            .flush_level_filter(spdlog::LevelFilter::All)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn main() {
    // Create a cli
    let matches = Command::new("cygno_pmt_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the configuration file"),
        )
        .get_matches();

    if let Err(e) = init_logging() {
        spdlog::error!("Could not create log file: {e}");
    }

    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            spdlog::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match Config::default().write_config_file(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("{e}"),
        }
        return;
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        spdlog::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("MIDAS Path: {}", config.midas_path.to_string_lossy());
    spdlog::info!("HDF5 Path: {}", config.hdf_path.to_string_lossy());
    spdlog::info!("DRS4 Correction: {} (site {})", config.drs4_correction, config.site);
    spdlog::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );

    // Setup the workers and their progress bars
    let pb_manager = MultiProgress::new();
    let style = ProgressStyle::with_template("[worker {prefix}] run {msg} {wide_bar} {percent}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let subsets: Vec<Vec<i32>> = create_subsets(&config)
        .into_iter()
        .filter(|subset| !subset.is_empty())
        .collect();
    let mut bars = Vec::new();
    let mut workers = Vec::new();
    for (idx, subset) in subsets.into_iter().enumerate() {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_prefix(idx.to_string());
        bars.push(bar);
        let conf = config.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, tx, idx, subset)
        }));
    }
    // Only the workers hold senders now, so recv fails once they are all done
    drop(tx);

    while let Ok(status) = rx.recv() {
        if let Some(bar) = bars.get(status.worker_id) {
            bar.set_message(status.run_number.to_string());
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    for (worker, bar) in workers.into_iter().zip(bars.iter()) {
        match worker.join() {
            Ok(Ok(())) => bar.finish(),
            Ok(Err(e)) => {
                bar.abandon();
                spdlog::error!("Processing failed with error: {e}");
            }
            Err(_) => spdlog::error!("Failed to join processing task!"),
        }
    }

    spdlog::info!("Done.");
}
