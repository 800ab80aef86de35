//! # cygno_pmt
//!
//! cygno_pmt decodes the PMT digitizer data recorded by the CYGNO data acquisition. It
//! reads the DGH0 (digitizer header) and DIG0 (waveform) banks of MIDAS run files,
//! splits the waveforms into one cube per digitizer board, optionally applies the DRS4
//! baseline and peak corrections to the V1742 data, and writes the result to HDF5.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### HDF5
//!
//! Before building, HDF5 must be installed. Typically this will be installed using a
//! package manager (homebrew, apt, etc), and the Rust libraries will auto detect the
//! location of the HDF install. If HDF5 lives in a custom location, write the following
//! into `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./cygno_pmt_cli` from the top
//! level repository.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! midas_path: /path/to/midas/files
//! hdf_path: /path/to/output
//! calibration_path: /path/to/drs4/tables
//! site: LNGS
//! drs4_correction: true
//! channel_offsets: [-0.3, -0.3, -0.3, -0.3, -0.3, -0.3, -0.3, -0.3]
//! first_run_number: 0
//! last_run_number: 0
//! n_threads: 1
//! ```
//!
//! - `midas_path` holds uncompressed `runNNNNN.mid` files. Compressed `.mid.gz` files
//! must be decompressed first.
//! - `calibration_path` holds `table_cell_{site}.txt` and `table_nsample_{site}.txt`,
//! one row per channel. It is only read when `drs4_correction` is set.
//! - `channel_offsets` are the DC offsets of the V1742 channels. Only channels with an
//! offset in [-0.35, -0.25) are baseline corrected.
//!
//! ## Output
//!
//! ```text
//! run00001.h5
//! events - min_event, max_event, version
//! |---- event_# - serial, timestamp
//! |    |---- v1742 - vertical_resolution, sampling_rate
//! |    |    |---- waveforms(dset, [waveform][channel][sample])
//! |    |    |---- offsets(dset)
//! |    |    |---- ttt(dset)
//! |    |    |---- sic(dset)
//! |    |---- v1720 - vertical_resolution, sampling_rate
//! |    |    |---- waveforms(dset)
//! |    |    |---- offsets(dset)
//! |    |    |---- ttt(dset)
//! ```
pub mod calibration;
pub mod config;
pub mod constants;
pub mod correction;
pub mod digitizer_header;
pub mod error;
pub mod event;
pub mod hdf_writer;
pub mod midas;
pub mod peak_correction;
pub mod pmt_data;
pub mod process;
pub mod worker_status;
