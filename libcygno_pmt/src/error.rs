use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigitizerHeaderError {
    #[error("DigitizerHeader received an empty raw header")]
    EmptyHeader,
    #[error("DigitizerHeader received a raw header of {0} words; at least {min} are required", min=MIN_HEADER_WORDS)]
    HeaderTooShort(usize),
    #[error("DigitizerHeader declares no boards")]
    NoBoards,
    #[error("DigitizerHeader is corrupted -- board {board} requires {required} words but only {available} remain")]
    Corrupted {
        board: usize,
        required: usize,
        available: usize,
    },
    #[error("DigitizerHeader found unsupported board model {model} at board {board}; expected {m1} or {m2}", m1=MODEL_V1742, m2=MODEL_V1720)]
    UnsupportedBoardModel { board: usize, model: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PmtDataError {
    #[error("PmtData was given {found} samples but the header declares {expected}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("PmtData could not size board {0}; its declared dimensions overflow")]
    DimensionOverflow(usize),
    #[error("PmtData has no board of model {0}")]
    BoardNotFound(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("DRS4 correction requires a board of model {0} in the header")]
    BoardNotFound(u32),
    #[error("DRS4 correction cannot handle a cube of {channels} channels by {samples} samples; expected at least {nch} channels of {ncell} samples", nch=DRS4_NUMBER_OF_CHANNELS, ncell=DRS4_NUMBER_OF_CELLS)]
    BadGeometry { channels: usize, samples: usize },
    #[error("DRS4 correction found {found} waveforms in the cube but {expected} start index cells in the header")]
    SicMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Failed to load calibration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("Calibration table {table} is {rows}x{columns}; at least {nch}x{ncell} is required", nch=DRS4_NUMBER_OF_CHANNELS, ncell=DRS4_NUMBER_OF_CELLS)]
    TableTooSmall {
        table: String,
        rows: usize,
        columns: usize,
    },
    #[error("Calibration received {0} channel offsets; at least {nch} are required", nch=DRS4_NUMBER_OF_CHANNELS)]
    TooFewOffsets(usize),
    #[error("Calibration does not recognize the site tag {0}")]
    UnknownSite(String),
    #[error("Calibration requires a calibration directory when DRS4 correction is enabled")]
    NoCalibrationPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("Bank {name} has type {found}, which cannot be read as {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: u32,
    },
    #[error("Bank {name} has {length} bytes, which is not a whole number of {expected}")]
    BadLength {
        name: String,
        expected: &'static str,
        length: usize,
    },
}

#[derive(Debug, Error)]
pub enum MidasEventError {
    #[error("Failed to parse buffer into a MidasEvent: {0}")]
    IOError(#[from] std::io::Error),
    #[error("MidasEvent buffer of {0} bytes is too small to hold an event header")]
    BufferTooSmall(usize),
    #[error("MidasEvent bank {0} runs past the end of the event")]
    BankOverrun(String),
}

#[derive(Debug, Error)]
pub enum MidasFileError {
    #[error("Error when parsing MidasEvent from MidasFile: {0}")]
    BadEvent(#[from] MidasEventError),
    #[error("Could not open MidasFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("MidasFile {0:?} is gzip compressed; decompress it before processing")]
    CompressedFile(PathBuf),
    #[error("Reached end of MidasFile")]
    EndOfFile,
    #[error("MidasFile ends inside an event: {expected} bytes of event data declared but only {found} remain")]
    TruncatedEvent { expected: usize, found: usize },
    #[error("MidasFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event failed due to bank error: {0}")]
    BankError(#[from] BankError),
    #[error("Event failed due to DigitizerHeader error: {0}")]
    HeaderError(#[from] DigitizerHeaderError),
    #[error("Event failed due to PmtData error: {0}")]
    DataError(#[from] PmtDataError),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config failed due to calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to MidasFile error: {0}")]
    MidasError(#[from] MidasFileError),
    #[error("Processor failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to correction error: {0}")]
    CorrectionError(#[from] CorrectionError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
