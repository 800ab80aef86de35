use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};
use std::ops::{Index, IndexMut};

use super::digitizer_header::{BoardModel, DigitizerHeader};
use super::error::PmtDataError;

/// The waveforms of a single board, indexed as `[waveform, channel, sample]`
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformCube {
    model: BoardModel,
    data: Array3<u16>,
}

impl WaveformCube {
    pub fn new(model: BoardModel, data: Array3<u16>) -> Self {
        Self { model, data }
    }

    pub fn model(&self) -> BoardModel {
        self.model
    }

    pub fn nwaveforms(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn nchannels(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn nsamples(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    /// All channels of one waveform as a `[channel, sample]` view
    pub fn waveform(&self, waveform: usize) -> ArrayView2<'_, u16> {
        self.data.index_axis(Axis(0), waveform)
    }

    pub fn waveform_mut(&mut self, waveform: usize) -> ArrayViewMut2<'_, u16> {
        self.data.index_axis_mut(Axis(0), waveform)
    }

    pub fn into_inner(self) -> Array3<u16> {
        self.data
    }
}

impl Index<[usize; 3]> for WaveformCube {
    type Output = u16;
    fn index(&self, index: [usize; 3]) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<[usize; 3]> for WaveformCube {
    fn index_mut(&mut self, index: [usize; 3]) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// PmtData is the content of the DIG0 bank split into one WaveformCube per board.
///
/// The bank is the concatenation of every board's samples, in header order. Within a
/// board, samples are laid out waveform-major, then channel, then sample, which is
/// exactly the standard layout of the cube.
#[derive(Debug, Clone, PartialEq)]
pub struct PmtData {
    cubes: Vec<WaveformCube>,
}

impl PmtData {
    /// Demultiplex the raw waveform bank according to the header.
    ///
    /// The bank length must equal the summed size of all boards, otherwise nothing is built.
    pub fn new(header: &DigitizerHeader, raw: &[u16]) -> Result<Self, PmtDataError> {
        let mut lengths = Vec::with_capacity(header.nboards());
        let mut expected: usize = 0;
        for (index, board) in header.boards().iter().enumerate() {
            let length = board
                .waveform_length()
                .ok_or(PmtDataError::DimensionOverflow(index))?;
            expected = expected
                .checked_add(length)
                .ok_or(PmtDataError::DimensionOverflow(index))?;
            lengths.push(length);
        }
        if expected != raw.len() {
            return Err(PmtDataError::LengthMismatch {
                expected,
                found: raw.len(),
            });
        }

        let mut cubes = Vec::with_capacity(header.nboards());
        let mut offset = 0;
        for (board, length) in header.boards().iter().zip(lengths) {
            let info = board.info();
            let slice = &raw[offset..offset + length];
            let data = Array3::from_shape_vec(
                (info.nwaveforms, info.nchannels, info.nsamples),
                slice.to_vec(),
            )
            .map_err(|_| PmtDataError::LengthMismatch {
                expected: length,
                found: slice.len(),
            })?;
            cubes.push(WaveformCube::new(board.model(), data));
            offset += length;
        }

        Ok(Self { cubes })
    }

    /// Get the waveforms of the board with the given model.
    ///
    /// If several boards share the model, the last one is returned.
    pub fn get_waveforms(&self, model: BoardModel) -> Result<&WaveformCube, PmtDataError> {
        self.cubes
            .iter()
            .rev()
            .find(|cube| cube.model() == model)
            .ok_or(PmtDataError::BoardNotFound(model.id()))
    }

    pub fn get_waveforms_mut(
        &mut self,
        model: BoardModel,
    ) -> Result<&mut WaveformCube, PmtDataError> {
        self.cubes
            .iter_mut()
            .rev()
            .find(|cube| cube.model() == model)
            .ok_or(PmtDataError::BoardNotFound(model.id()))
    }

    /// All cubes, in header order
    pub fn cubes(&self) -> &[WaveformCube] {
        &self.cubes
    }

    pub fn into_cubes(self) -> Vec<WaveformCube> {
        self.cubes
    }
}
