use super::calibration::Calibration;
use super::constants::*;
use super::digitizer_header::{BoardModel, DigitizerHeader};
use super::error::CorrectionError;
use super::peak_correction::peak_correction;
use super::pmt_data::WaveformCube;

/// Subtract the DRS4 'cell' and 'nsample' baselines from a V1742 cube.
///
/// The 'cell' table is indexed by the physical DRS4 cell, so each waveform is rotated
/// by its start index cell; the 'nsample' table is indexed by sample position. Only
/// channels whose DC offset lies inside the calibrated band are corrected. Results are
/// clamped to the u16 range.
pub fn apply_drs4_corrections(
    header: &DigitizerHeader,
    mut cube: WaveformCube,
    calibration: &Calibration,
) -> Result<WaveformCube, CorrectionError> {
    let sic = header
        .find_board(BoardModel::V1742)
        .and_then(|(_, board)| board.start_index_cells())
        .ok_or(CorrectionError::BoardNotFound(MODEL_V1742))?;
    if cube.nchannels() < DRS4_NUMBER_OF_CHANNELS || cube.nsamples() < DRS4_NUMBER_OF_CELLS {
        return Err(CorrectionError::BadGeometry {
            channels: cube.nchannels(),
            samples: cube.nsamples(),
        });
    }
    if sic.len() != cube.nwaveforms() {
        return Err(CorrectionError::SicMismatch {
            expected: sic.len(),
            found: cube.nwaveforms(),
        });
    }

    let cell = calibration.tables.cell();
    let nsample = calibration.tables.nsample();
    for (index, start) in sic.iter().enumerate() {
        let start = *start as usize % DRS4_NUMBER_OF_CELLS;
        let mut waveform = cube.waveform_mut(index);
        for ch in 0..DRS4_NUMBER_OF_CHANNELS {
            if !calibration.offsets.is_correction_eligible(ch) {
                continue;
            }
            for s in 0..DRS4_NUMBER_OF_CELLS {
                let rotated = (s + start) % DRS4_NUMBER_OF_CELLS;
                let value =
                    i32::from(waveform[[ch, s]]) - cell[[ch, rotated]] - nsample[[ch, s]];
                waveform[[ch, s]] = value.clamp(0, u16::MAX as i32) as u16;
            }
        }
    }
    Ok(cube)
}

/// A single correction stage. Passes own the cube while they work on it.
pub trait CorrectionPass {
    fn name(&self) -> &'static str;
    fn apply(
        &self,
        header: &DigitizerHeader,
        cube: WaveformCube,
    ) -> Result<WaveformCube, CorrectionError>;
}

/// The DRS4 cell/nsample baseline subtraction
#[derive(Debug, Clone, Copy)]
pub struct Drs4BaselinePass<'a> {
    calibration: &'a Calibration,
}

impl<'a> Drs4BaselinePass<'a> {
    pub fn new(calibration: &'a Calibration) -> Self {
        Self { calibration }
    }
}

impl CorrectionPass for Drs4BaselinePass<'_> {
    fn name(&self) -> &'static str {
        "drs4_baseline"
    }

    fn apply(
        &self,
        header: &DigitizerHeader,
        cube: WaveformCube,
    ) -> Result<WaveformCube, CorrectionError> {
        if cube.model() != BoardModel::V1742 {
            return Ok(cube);
        }
        apply_drs4_corrections(header, cube, self.calibration)
    }
}

/// Peak correction of every waveform in a V1742 cube
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakPass;

impl CorrectionPass for PeakPass {
    fn name(&self) -> &'static str {
        "peak"
    }

    fn apply(
        &self,
        _header: &DigitizerHeader,
        mut cube: WaveformCube,
    ) -> Result<WaveformCube, CorrectionError> {
        if cube.model() != BoardModel::V1742 {
            return Ok(cube);
        }
        for index in 0..cube.nwaveforms() {
            peak_correction(cube.waveform_mut(index))?;
        }
        Ok(cube)
    }
}

/// An ordered list of correction passes applied to one cube at a time.
///
/// Passes only touch V1742 cubes; anything else passes through unchanged.
#[derive(Default)]
pub struct CorrectionPipeline<'a> {
    passes: Vec<Box<dyn CorrectionPass + Send + Sync + 'a>>,
}

impl<'a> CorrectionPipeline<'a> {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The standard DRS4 chain: baseline subtraction followed by peak correction
    pub fn drs4(calibration: &'a Calibration) -> Self {
        Self::new()
            .with_pass(Drs4BaselinePass::new(calibration))
            .with_pass(PeakPass)
    }

    pub fn with_pass<P: CorrectionPass + Send + Sync + 'a>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn apply(
        &self,
        header: &DigitizerHeader,
        cube: WaveformCube,
    ) -> Result<WaveformCube, CorrectionError> {
        self.passes
            .iter()
            .try_fold(cube, |cube, pass| pass.apply(header, cube))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{ChannelOffsets, CorrectionTables, SiteTag};
    use crate::constants::MODEL_V1720;
    use crate::digitizer_header::tests::{encode_board, encode_header};
    use ndarray::{Array2, Array3};

    const BASELINE: u16 = 2000;

    fn header_with_sic(sic: &[u32]) -> DigitizerHeader {
        let nwaveforms = sic.len() as u32;
        let mut board = vec![MODEL_V1742, 1024, 8, nwaveforms, 4096, 750];
        board.extend([0u32; 8]);
        board.extend((0..nwaveforms).map(|wf| 1000 + wf));
        board.extend_from_slice(sic);
        DigitizerHeader::new(&encode_header(&[board])).unwrap()
    }

    fn flat_cube(nwaveforms: usize) -> WaveformCube {
        WaveformCube::new(
            BoardModel::V1742,
            Array3::from_elem((nwaveforms, 8, 1024), BASELINE),
        )
    }

    fn calibration(cell: Array2<i32>, nsample: Array2<i32>, offsets: Vec<f32>) -> Calibration {
        Calibration::new(
            SiteTag::Lngs,
            CorrectionTables::new(cell, nsample).unwrap(),
            ChannelOffsets::new(offsets).unwrap(),
        )
    }

    fn ramp_table() -> Array2<i32> {
        Array2::from_shape_fn((8, 1024), |(_, k)| k as i32 % 50)
    }

    #[test]
    fn test_zero_tables_leave_cube_unchanged() {
        let header = header_with_sic(&[17, 900]);
        let zeros = Array2::<i32>::zeros((8, 1024));
        let cal = calibration(zeros.clone(), zeros, vec![-0.30; 8]);
        let corrected = apply_drs4_corrections(&header, flat_cube(2), &cal).unwrap();
        assert_eq!(corrected, flat_cube(2));
    }

    #[test]
    fn test_out_of_band_channel_untouched() {
        let header = header_with_sic(&[3]);
        let mut offsets = vec![-0.30; 8];
        offsets[4] = 0.0;
        let cal = calibration(ramp_table(), ramp_table(), offsets);
        let corrected = apply_drs4_corrections(&header, flat_cube(1), &cal).unwrap();
        for s in 0..1024 {
            assert_eq!(corrected[[0, 4, s]], BASELINE);
        }
        assert_ne!(corrected[[0, 3, 10]], BASELINE);
    }

    #[test]
    fn test_cell_rotation_and_nsample() {
        let header = header_with_sic(&[10]);
        let cell = Array2::from_shape_fn((8, 1024), |(_, k)| k as i32);
        let nsample = Array2::from_shape_fn((8, 1024), |(c, _)| c as i32);
        let cal = calibration(cell, nsample, vec![-0.30; 8]);
        let corrected = apply_drs4_corrections(&header, flat_cube(1), &cal).unwrap();
        assert_eq!(corrected[[0, 0, 0]], BASELINE - 10);
        assert_eq!(corrected[[0, 0, 1020]], BASELINE - 6);
        assert_eq!(corrected[[0, 5, 0]], BASELINE - 10 - 5);
    }

    #[test]
    fn test_clamped_to_zero() {
        let header = header_with_sic(&[0]);
        let cell = Array2::from_elem((8, 1024), 3000);
        let zeros = Array2::<i32>::zeros((8, 1024));
        let cal = calibration(cell, zeros, vec![-0.30; 8]);
        let corrected = apply_drs4_corrections(&header, flat_cube(1), &cal).unwrap();
        assert_eq!(corrected[[0, 0, 0]], 0);
    }

    #[test]
    fn test_requires_v1742_board() {
        let raw = encode_header(&[encode_board(MODEL_V1720, 1024, 8, 1)]);
        let header = DigitizerHeader::new(&raw).unwrap();
        let zeros = Array2::<i32>::zeros((8, 1024));
        let cal = calibration(zeros.clone(), zeros, vec![-0.30; 8]);
        assert_eq!(
            apply_drs4_corrections(&header, flat_cube(1), &cal),
            Err(CorrectionError::BoardNotFound(MODEL_V1742))
        );
    }

    #[test]
    fn test_sic_mismatch() {
        let header = header_with_sic(&[0, 1, 2]);
        let zeros = Array2::<i32>::zeros((8, 1024));
        let cal = calibration(zeros.clone(), zeros, vec![-0.30; 8]);
        assert_eq!(
            apply_drs4_corrections(&header, flat_cube(2), &cal),
            Err(CorrectionError::SicMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_pipeline_runs_peak_after_baseline() {
        let header = header_with_sic(&[0, 0]);
        let zeros = Array2::<i32>::zeros((8, 1024));
        let cal = calibration(zeros.clone(), zeros, vec![-0.30; 8]);
        let pipeline = CorrectionPipeline::drs4(&cal);
        assert_eq!(pipeline.pass_names(), vec!["drs4_baseline", "peak"]);

        let mut cube = flat_cube(2);
        for ch in 0..8 {
            cube[[1, ch, 700]] = BASELINE - 35;
        }
        let corrected = pipeline.apply(&header, cube).unwrap();
        assert_eq!(corrected, flat_cube(2));
    }

    #[test]
    fn test_pipeline_skips_other_models() {
        let header = header_with_sic(&[0]);
        let cal = calibration(ramp_table(), ramp_table(), vec![-0.30; 8]);
        let slow = WaveformCube::new(BoardModel::V1720, Array3::from_elem((1, 8, 16), 7));
        let corrected = CorrectionPipeline::drs4(&cal)
            .apply(&header, slow.clone())
            .unwrap();
        assert_eq!(corrected, slow);
    }
}
