use std::sync::mpsc::Sender;

use super::calibration::Calibration;
use super::config::Config;
use super::correction::CorrectionPipeline;
use super::digitizer_header::BoardModel;
use super::error::{MidasFileError, ProcessorError};
use super::event::{decode_event, DecodedEvent};
use super::hdf_writer::HDFWriter;
use super::midas::{MidasEvent, MidasFile};
use super::pmt_data::WaveformCube;
use super::worker_status::WorkerStatus;

/// Run the correction pipeline over the V1742 cube of an event.
///
/// With several V1742 boards only the last one is corrected, matching how the
/// waveforms are looked up.
fn correct_event(
    event: DecodedEvent,
    pipeline: Option<&CorrectionPipeline>,
) -> Result<Vec<WaveformCube>, ProcessorError> {
    let mut cubes = match event.data {
        Some(data) => data.into_cubes(),
        None => return Ok(Vec::new()),
    };
    let pipeline = match pipeline {
        Some(p) => p,
        None => return Ok(cubes),
    };
    match cubes
        .iter()
        .rposition(|cube| cube.model() == BoardModel::V1742)
    {
        Some(index) => {
            let cube = cubes.remove(index);
            cubes.insert(index, pipeline.apply(&event.header, cube)?);
        }
        None => spdlog::warn!(
            "Event has no board of model {}, DRS4 correction skipped",
            BoardModel::V1742
        ),
    }
    Ok(cubes)
}

/// Handle a single MIDAS event. Returns true if an event was written
fn process_event(
    event: &MidasEvent,
    pipeline: Option<&CorrectionPipeline>,
    writer: &mut HDFWriter,
    event_counter: &u64,
) -> Result<bool, ProcessorError> {
    let decoded = match decode_event(event) {
        Ok(Some(decoded)) => decoded,
        Ok(None) => return Ok(false),
        Err(e) => {
            spdlog::error!(
                "Failed to decode event {}: {e}. Skipping.",
                event.header.serial_number
            );
            return Ok(false);
        }
    };
    spdlog::debug!("Event {}:\n{}", event.header.serial_number, decoded.header);
    let header = decoded.header.clone();
    let cubes = match correct_event(decoded, pipeline) {
        Ok(cubes) => cubes,
        Err(ProcessorError::CorrectionError(e)) => {
            spdlog::error!(
                "Failed to correct event {}: {e}. Skipping.",
                event.header.serial_number
            );
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    writer.write_event(&event.header, &header, &cubes, event_counter)?;
    Ok(true)
}

/// The main loop of cygno_pmt.
///
/// This takes in a config, the run-level calibration (if DRS4 correction is enabled) and a
/// progress channel, and converts one MIDAS run into an HDF5 file.
pub fn process_run(
    config: &Config,
    calibration: Option<&Calibration>,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let midas_path = config.get_midas_file_name(run_number);
    let hdf_path = config.get_hdf_file_name(run_number)?;
    let mut midas = MidasFile::new(&midas_path)?;
    let mut writer = HDFWriter::new(&hdf_path)?;
    let pipeline = calibration.map(CorrectionPipeline::drs4);
    if let Some(p) = &pipeline {
        spdlog::info!("Correction passes: {}", p.pass_names().join(", "));
    }

    let total_data_size = midas.get_size_bytes();
    spdlog::info!(
        "Total run size: {}",
        human_bytes::human_bytes(total_data_size as f64)
    );
    let flush_frac: f32 = 0.01;
    let flush_val = (total_data_size as f64 * flush_frac as f64) as u64;
    let mut last_flush: u64 = 0;

    tx.send(WorkerStatus::new(0.0, run_number, *worker_id))?;
    let mut event_counter: u64 = 0;
    loop {
        let event = match midas.get_next_event() {
            Ok(event) => event,
            Err(MidasFileError::EndOfFile) => break,
            Err(MidasFileError::TruncatedEvent { expected, found }) => {
                spdlog::warn!(
                    "Run {run_number} ends with a truncated event, {} of event data lost",
                    human_bytes::human_bytes((expected - found) as f64)
                );
                break;
            }
            Err(e) => return Err(ProcessorError::MidasError(e)),
        };

        if midas.get_bytes_read() - last_flush > flush_val {
            last_flush = midas.get_bytes_read();
            tx.send(WorkerStatus::new(
                last_flush as f32 / total_data_size as f32,
                run_number,
                *worker_id,
            ))?;
        }

        if event.header.is_special() {
            if event.header.is_begin_of_run() {
                if let Some(start) = event.header.datetime() {
                    spdlog::info!("Run {run_number} started at {start}");
                }
            }
            continue;
        }

        if process_event(&event, pipeline.as_ref(), &mut writer, &event_counter)? {
            event_counter += 1;
        }
    }
    writer.close(event_counter)?;

    tx.send(WorkerStatus::new(1.0, run_number, *worker_id))?;
    spdlog::info!("Done with run {run_number}.");
    Ok(())
}

/// The function to be called by a separate thread.
/// Allows multiple runs to be processed
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let runs: Vec<i32> = (config.first_run_number..(config.last_run_number + 1)).collect();
    process_subset(config, tx, worker_id, runs)
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    let calibration = config.load_calibration()?;
    for run in subset {
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            process_run(&config, calibration.as_ref(), run, &tx, &worker_id)?;
            spdlog::info!("Finished processing run {}.", run);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}
