use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use super::constants::*;
use super::error::CalibrationError;

const CELL_TABLE_NAME: &str = "table_cell";
const NSAMPLE_TABLE_NAME: &str = "table_nsample";

/// The acquisition site the data (and therefore the DRS4 tables) come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SiteTag {
    #[default]
    Lngs,
    Lnf,
}

impl TryFrom<String> for SiteTag {
    type Error = CalibrationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<SiteTag> for String {
    fn from(value: SiteTag) -> Self {
        value.to_string()
    }
}

impl FromStr for SiteTag {
    type Err = CalibrationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LNGS" => Ok(Self::Lngs),
            "LNF" => Ok(Self::Lnf),
            _ => Err(CalibrationError::UnknownSite(s.to_string())),
        }
    }
}

impl fmt::Display for SiteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lngs => write!(f, "LNGS"),
            Self::Lnf => write!(f, "LNF"),
        }
    }
}

/// The DRS4 'cell' and 'nsample' baseline tables, one row per channel.
///
/// Both tables are guaranteed to hold at least 8 channels of 1024 cells.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTables {
    cell: Array2<i32>,
    nsample: Array2<i32>,
}

impl CorrectionTables {
    pub fn new(cell: Array2<i32>, nsample: Array2<i32>) -> Result<Self, CalibrationError> {
        Self::check_shape(CELL_TABLE_NAME, &cell)?;
        Self::check_shape(NSAMPLE_TABLE_NAME, &nsample)?;
        Ok(Self { cell, nsample })
    }

    /// Load the tables for a site from a directory containing
    /// `table_cell_{TAG}.txt` and `table_nsample_{TAG}.txt`
    pub fn load(dir: &Path, site: SiteTag) -> Result<Self, CalibrationError> {
        let cell = Self::read_table(dir, CELL_TABLE_NAME, site)?;
        let nsample = Self::read_table(dir, NSAMPLE_TABLE_NAME, site)?;
        Self::new(cell, nsample)
    }

    pub fn cell(&self) -> &Array2<i32> {
        &self.cell
    }

    pub fn nsample(&self) -> &Array2<i32> {
        &self.nsample
    }

    fn read_table(dir: &Path, name: &str, site: SiteTag) -> Result<Array2<i32>, CalibrationError> {
        let path = dir.join(format!("{name}_{site}.txt"));
        if !path.exists() {
            return Err(CalibrationError::BadFilePath(path));
        }
        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        spdlog::info!("Loaded DRS4 table {}", path.to_string_lossy());
        parse_table(name, &contents)
    }

    fn check_shape(name: &str, table: &Array2<i32>) -> Result<(), CalibrationError> {
        let (rows, columns) = table.dim();
        if rows < DRS4_NUMBER_OF_CHANNELS || columns < DRS4_NUMBER_OF_CELLS {
            return Err(CalibrationError::TableTooSmall {
                table: name.to_string(),
                rows,
                columns,
            });
        }
        Ok(())
    }
}

/// Parse a text table: one row per line, values separated by whitespace or commas.
///
/// Rows may be ragged; the table is cut to the shortest row.
pub fn parse_table(name: &str, contents: &str) -> Result<Array2<i32>, CalibrationError> {
    let mut rows: Vec<Vec<i32>> = Vec::new();
    for line in contents.lines() {
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.parse::<i32>())
            .collect::<Result<Vec<i32>, _>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let columns = rows.iter().map(|row| row.len()).min().unwrap_or(0);
    if rows.len() < DRS4_NUMBER_OF_CHANNELS || columns < DRS4_NUMBER_OF_CELLS {
        return Err(CalibrationError::TableTooSmall {
            table: name.to_string(),
            rows: rows.len(),
            columns,
        });
    }
    Ok(Array2::from_shape_fn((rows.len(), columns), |(r, c)| {
        rows[r][c]
    }))
}

/// Per-channel DC offsets of the V1742, as configured for the run
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOffsets(Vec<f32>);

impl ChannelOffsets {
    pub fn new(offsets: Vec<f32>) -> Result<Self, CalibrationError> {
        if offsets.len() < DRS4_NUMBER_OF_CHANNELS {
            return Err(CalibrationError::TooFewOffsets(offsets.len()));
        }
        Ok(Self(offsets))
    }

    /// The DRS4 tables were measured only for offsets in [-0.35, -0.25)
    pub fn is_correction_eligible(&self, channel: usize) -> bool {
        self.0
            .get(channel)
            .is_some_and(|offset| (DRS4_OFFSET_BAND_LOW..DRS4_OFFSET_BAND_HIGH).contains(offset))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Everything the DRS4 correction needs, built once per run and shared read-only
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub site: SiteTag,
    pub tables: CorrectionTables,
    pub offsets: ChannelOffsets,
}

impl Calibration {
    pub fn new(site: SiteTag, tables: CorrectionTables, offsets: ChannelOffsets) -> Self {
        Self {
            site,
            tables,
            offsets,
        }
    }

    pub fn load(dir: &Path, site: SiteTag, offsets: Vec<f32>) -> Result<Self, CalibrationError> {
        let offsets = ChannelOffsets::new(offsets)?;
        let tables = CorrectionTables::load(dir, site)?;
        Ok(Self::new(site, tables, offsets))
    }
}
