use std::fmt;

use super::constants::*;
use super::error::DigitizerHeaderError;

/// The digitizer models the DAQ can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardModel {
    V1742,
    V1720,
}

impl TryFrom<u32> for BoardModel {
    type Error = u32;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            MODEL_V1742 => Ok(Self::V1742),
            MODEL_V1720 => Ok(Self::V1720),
            _ => Err(value),
        }
    }
}

impl fmt::Display for BoardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl BoardModel {
    /// The numeric model id as written in the raw header
    pub fn id(&self) -> u32 {
        match self {
            Self::V1742 => MODEL_V1742,
            Self::V1720 => MODEL_V1720,
        }
    }

    /// Header words recorded per waveform: the TTT, plus the SIC for the DRS4 board
    fn words_per_waveform(&self) -> usize {
        match self {
            Self::V1742 => 2,
            Self::V1720 => 1,
        }
    }

    /// Length in words of a single board record in the raw header.
    ///
    /// Returns None if the declared counts overflow.
    pub fn record_length(&self, nchannels: usize, nwaveforms: usize) -> Option<usize> {
        BOARD_FIXED_FIELDS
            .checked_add(nchannels)?
            .checked_add(nwaveforms.checked_mul(self.words_per_waveform())?)
    }
}

/// The fields every board record carries, independent of model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    pub nsamples: usize,
    pub nchannels: usize,
    pub nwaveforms: usize,
    pub vertical_resolution: u32,
    pub sampling_rate: u32,
    pub offsets: Vec<u32>,
    pub ttt: Vec<u32>,
}

/// Metadata of a single digitizer board.
///
/// Only the V1742 (DRS4) records a start index cell per waveform, so the SIC list
/// lives on that variant alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardMetadata {
    V1742 { info: BoardInfo, sic: Vec<u32> },
    V1720 { info: BoardInfo },
}

impl BoardMetadata {
    pub fn model(&self) -> BoardModel {
        match self {
            Self::V1742 { .. } => BoardModel::V1742,
            Self::V1720 { .. } => BoardModel::V1720,
        }
    }

    pub fn info(&self) -> &BoardInfo {
        match self {
            Self::V1742 { info, .. } => info,
            Self::V1720 { info } => info,
        }
    }

    /// Start index cells of each waveform; None for boards without a DRS4 chip
    pub fn start_index_cells(&self) -> Option<&[u32]> {
        match self {
            Self::V1742 { sic, .. } => Some(sic),
            Self::V1720 { .. } => None,
        }
    }

    /// Number of samples this board contributes to the waveform bank
    pub fn waveform_length(&self) -> Option<usize> {
        let info = self.info();
        info.nwaveforms
            .checked_mul(info.nchannels)?
            .checked_mul(info.nsamples)
    }
}

/// Bounds-checked read view over the raw header words
struct WordCursor<'a> {
    words: &'a [u32],
    position: usize,
}

impl<'a> WordCursor<'a> {
    fn new(words: &'a [u32]) -> Self {
        Self { words, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.words.len() - self.position
    }

    /// Take the next n words, or None if fewer remain
    fn take(&mut self, n: usize) -> Option<&'a [u32]> {
        let end = self.position.checked_add(n)?;
        let slice = self.words.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }
}

/// DigitizerHeader is the decoded content of the DGH0 bank.
///
/// The raw header is a flat array of 32-bit words: the number of boards followed by one
/// record per board. Each record holds six fixed fields (model, number of samples,
/// number of channels, number of waveforms, vertical resolution, sampling rate), then
/// one DC offset per channel, one trigger time tag per waveform, and for the V1742 one
/// start index cell per waveform. Boards keep the order they have in the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitizerHeader {
    boards: Vec<BoardMetadata>,
}

impl TryFrom<&[u32]> for DigitizerHeader {
    type Error = DigitizerHeaderError;
    fn try_from(raw: &[u32]) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl DigitizerHeader {
    /// Decode a raw header. Either every board decodes or an error is returned.
    pub fn new(raw: &[u32]) -> Result<Self, DigitizerHeaderError> {
        if raw.is_empty() {
            return Err(DigitizerHeaderError::EmptyHeader);
        }
        if raw.len() < MIN_HEADER_WORDS {
            return Err(DigitizerHeaderError::HeaderTooShort(raw.len()));
        }

        let mut cursor = WordCursor::new(raw);
        let nboards = match cursor.take(BOARD_COUNT_WORDS) {
            Some(words) => words[0] as usize,
            None => return Err(DigitizerHeaderError::HeaderTooShort(raw.len())),
        };
        if nboards == 0 {
            return Err(DigitizerHeaderError::NoBoards);
        }

        // Cap the reservation; a corrupted count should not allocate
        let mut boards = Vec::with_capacity(nboards.min(raw.len() / MIN_HEADER_WORDS + 1));
        for board in 0..nboards {
            boards.push(Self::decode_board(&mut cursor, board)?);
        }

        if cursor.remaining() != 0 {
            spdlog::debug!(
                "DigitizerHeader ignored {} trailing words after {} boards",
                cursor.remaining(),
                nboards
            );
        }

        Ok(Self { boards })
    }

    fn decode_board(
        cursor: &mut WordCursor,
        board: usize,
    ) -> Result<BoardMetadata, DigitizerHeaderError> {
        let available = cursor.remaining();
        let corrupted = |required: usize| DigitizerHeaderError::Corrupted {
            board,
            required,
            available,
        };

        let fixed = cursor
            .take(BOARD_FIXED_FIELDS)
            .ok_or_else(|| corrupted(BOARD_FIXED_FIELDS))?;
        let model = BoardModel::try_from(fixed[0])
            .map_err(|model| DigitizerHeaderError::UnsupportedBoardModel { board, model })?;
        let nsamples = fixed[1] as usize;
        let nchannels = fixed[2] as usize;
        let nwaveforms = fixed[3] as usize;

        let required = model
            .record_length(nchannels, nwaveforms)
            .unwrap_or(usize::MAX);
        if available < required {
            return Err(corrupted(required));
        }

        let offsets = cursor
            .take(nchannels)
            .ok_or_else(|| corrupted(required))?
            .to_vec();
        let ttt = cursor
            .take(nwaveforms)
            .ok_or_else(|| corrupted(required))?
            .to_vec();
        let info = BoardInfo {
            nsamples,
            nchannels,
            nwaveforms,
            vertical_resolution: fixed[4],
            sampling_rate: fixed[5],
            offsets,
            ttt,
        };

        let metadata = match model {
            BoardModel::V1742 => {
                let sic = cursor
                    .take(nwaveforms)
                    .ok_or_else(|| corrupted(required))?
                    .to_vec();
                BoardMetadata::V1742 { info, sic }
            }
            BoardModel::V1720 => BoardMetadata::V1720 { info },
        };
        spdlog::debug!(
            "Decoded board {} -- model: {} channels: {} samples: {} waveforms: {}",
            board,
            model,
            nchannels,
            nsamples,
            nwaveforms
        );
        Ok(metadata)
    }

    pub fn nboards(&self) -> usize {
        self.boards.len()
    }

    pub fn boards(&self) -> &[BoardMetadata] {
        &self.boards
    }

    pub fn board(&self, index: usize) -> Option<&BoardMetadata> {
        self.boards.get(index)
    }

    /// Find the board of a given model along with its position in the header.
    ///
    /// If several boards share the model, the last one is returned.
    pub fn find_board(&self, model: BoardModel) -> Option<(usize, &BoardMetadata)> {
        self.boards
            .iter()
            .enumerate()
            .rev()
            .find(|(_, board)| board.model() == model)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[u32]) -> fmt::Result {
    for value in values {
        write!(f, "{value}, ")?;
    }
    writeln!(f)
}

impl fmt::Display for DigitizerHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "--------------------------";
        let double_rule = "==========================";
        writeln!(f, "{double_rule}")?;
        for (index, board) in self.boards.iter().enumerate() {
            let info = board.info();
            writeln!(f, "Board # {index}")?;
            writeln!(f, "model:     {}", board.model())?;
            writeln!(f, "length:    {}", info.nsamples)?;
            writeln!(f, "channels:  {}", info.nchannels)?;
            writeln!(f, "nwfs:      {}", info.nwaveforms)?;
            writeln!(f, "vresol:    {}", info.vertical_resolution)?;
            writeln!(f, "samp.rate: {}", info.sampling_rate)?;
            writeln!(f, "{rule}")?;
            writeln!(f, "channel offsets:")?;
            write_list(f, &info.offsets)?;
            writeln!(f, "{rule}")?;
            writeln!(f, "event TTTs:")?;
            write_list(f, &info.ttt)?;
            writeln!(f, "{rule}")?;
            writeln!(f, "event SICs:")?;
            match board.start_index_cells() {
                Some(sic) => write_list(f, sic)?,
                None => writeln!(f, "none")?,
            }
            writeln!(f, "{double_rule}")?;
        }
        Ok(())
    }
}
