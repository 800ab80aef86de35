use hdf5::types::VarLenUnicode;
use hdf5::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::digitizer_header::{BoardMetadata, DigitizerHeader};
use super::error::HDF5WriterError;
use super::midas::EventHeader;
use super::pmt_data::WaveformCube;

const EVENTS_NAME: &str = "events";
const WAVEFORMS_NAME: &str = "waveforms";
const OFFSETS_NAME: &str = "offsets";
const TTT_NAME: &str = "ttt";
const SIC_NAME: &str = "sic";

// All event counters start from 0 by law
const START_EVENT_NUMBER: u64 = 0;
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing decoded digitizer events.
#[allow(dead_code)]
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    file_path: PathBuf,
    events_group: hdf5::Group,
    last_event: u64,
    first_timestamp: u32,
    last_timestamp: u32,
}
// Structure
// events - min_event, max_event, version
// |---- event_# - serial, timestamp
// |    |---- v1742 - vertical_resolution, sampling_rate
// |    |    |---- waveforms(dset, [waveform][channel][sample])
// |    |    |---- offsets(dset)
// |    |    |---- ttt(dset)
// |    |    |---- sic(dset)
// |    |---- v1720 - vertical_resolution, sampling_rate
// |    |    |---- waveforms(dset), offsets(dset), ttt(dset)

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the events group
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);

        let events_group = file_handle.create_group(EVENTS_NAME)?;
        events_group.new_attr::<u64>().create("min_event")?;
        events_group.new_attr::<u64>().create("max_event")?;
        events_group
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(
                &VarLenUnicode::from_str(&version)
                    .map_err(|e| hdf5::Error::from(e.to_string()))?,
            )?;

        Ok(Self {
            file_handle,
            file_path: path.to_path_buf(),
            events_group,
            last_event: START_EVENT_NUMBER,
            first_timestamp: 0,
            last_timestamp: 0,
        })
    }

    /// Write one event. `cubes` are the (possibly corrected) waveforms in header order;
    /// boards without waveforms get their metadata only.
    pub fn write_event(
        &mut self,
        midas_header: &EventHeader,
        header: &DigitizerHeader,
        cubes: &[WaveformCube],
        event_counter: &u64,
    ) -> Result<(), HDF5WriterError> {
        if *event_counter == START_EVENT_NUMBER {
            self.first_timestamp = midas_header.timestamp;
        }
        if *event_counter >= self.last_event {
            self.last_event = *event_counter;
            self.last_timestamp = midas_header.timestamp;
        }

        let event_group = self
            .events_group
            .create_group(&format!("event_{}", event_counter))?;
        event_group
            .new_attr::<u32>()
            .create("serial")?
            .write_scalar(&midas_header.serial_number)?;
        event_group
            .new_attr::<u32>()
            .create("timestamp")?
            .write_scalar(&midas_header.timestamp)?;

        for (index, board) in header.boards().iter().enumerate() {
            let mut name = format!("v{}", board.model());
            if event_group.group(&name).is_ok() {
                name = format!("{name}_{index}");
            }
            let board_group = event_group.create_group(&name)?;
            self.write_board(&board_group, board, cubes.get(index))?;
        }

        Ok(())
    }

    fn write_board(
        &self,
        group: &hdf5::Group,
        board: &BoardMetadata,
        cube: Option<&WaveformCube>,
    ) -> Result<(), HDF5WriterError> {
        let info = board.info();
        group
            .new_attr::<u32>()
            .create("vertical_resolution")?
            .write_scalar(&info.vertical_resolution)?;
        group
            .new_attr::<u32>()
            .create("sampling_rate")?
            .write_scalar(&info.sampling_rate)?;
        group
            .new_dataset_builder()
            .with_data(info.offsets.as_slice())
            .create(OFFSETS_NAME)?;
        group
            .new_dataset_builder()
            .with_data(info.ttt.as_slice())
            .create(TTT_NAME)?;
        if let Some(sic) = board.start_index_cells() {
            group
                .new_dataset_builder()
                .with_data(sic)
                .create(SIC_NAME)?;
        }
        if let Some(cube) = cube {
            group
                .new_dataset_builder()
                .with_data(cube.data())
                .create(WAVEFORMS_NAME)?;
        }
        Ok(())
    }

    /// Write meta information on first and last events, consume the writer
    pub fn close(self, n_events: u64) -> Result<(), HDF5WriterError> {
        self.events_group
            .attr("min_event")?
            .write_scalar(&START_EVENT_NUMBER)?;
        self.events_group
            .attr("max_event")?
            .write_scalar(&self.last_event)?;
        spdlog::info!(
            "{} events written to {}. Run lasted {} seconds.",
            n_events,
            self.file_path.to_string_lossy(),
            self.last_timestamp.saturating_sub(self.first_timestamp),
        );
        Ok(())
    }
}
