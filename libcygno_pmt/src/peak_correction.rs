// Peak correction for the V1742 (DRS4) digitizer.
//
// The DRS4 occasionally produces narrow dips that show up at the same sample index on
// (nearly) every channel of a group. Those are pickup, not signal. A dip seen on fewer
// than PEAK_MAJORITY channels is left alone since it may be a real pulse.
//
// Only the first DRS4_NUMBER_OF_CHANNELS channels and DRS4_NUMBER_OF_CELLS samples are
// touched. Must run after the cell/nsample baseline correction.
use ndarray::ArrayViewMut2;

use super::constants::*;
use super::error::CorrectionError;

/// Does sample i of this channel look like the bottom of a dip?
fn discontinuity_vote(w: &[i32], i: usize) -> bool {
    let n = w.len();
    let t = PEAK_JUMP_THRESHOLD;
    if i == 1 {
        // Sample 1 (or samples 1 and 2) sit below what follows
        w[2] - w[1] > t || (w[3] - w[1] > t && w[3] - w[2] > t)
    } else if i == n - 1 {
        w[n - 2] - w[n - 1] > t
    } else {
        let dropped = w[i - 1] - w[i] > t;
        let single = w[i + 1] - w[i] > t;
        let double =
            i + 2 < n && w[i + 2] - w[i] > t && (w[i + 1] - w[i]).abs() < PEAK_FLAT_THRESHOLD;
        dropped && (single || double)
    }
}

/// Is the channel more than the jump threshold below its mean for a full window from i?
fn sustained_low_vote(w: &[i32], i: usize, mean: f64) -> bool {
    if i + PEAK_SUSTAINED_WINDOW >= w.len() {
        return false;
    }
    w[i..i + PEAK_SUSTAINED_WINDOW]
        .iter()
        .all(|&v| mean - v as f64 > PEAK_JUMP_THRESHOLD as f64)
}

/// Replace the dip at sample i with its neighbours, using the same sub-rule as the vote
fn repair_discontinuity(w: &mut [i32], i: usize) {
    let n = w.len();
    let t = PEAK_JUMP_THRESHOLD;
    if i == 1 {
        if w[2] - w[1] > t {
            w[0] = w[2];
            w[1] = w[2];
        } else {
            w[0] = w[3];
            w[1] = w[3];
            w[2] = w[3];
        }
    } else if i == n - 1 {
        w[n - 1] = w[n - 2];
    } else if w[i + 1] - w[i] > t {
        w[i] = (w[i - 1] + w[i + 1]) / 2;
    } else if i + 2 < n {
        let fill = (w[i - 1] + w[i + 2]) / 2;
        w[i] = fill;
        w[i + 1] = fill;
    } else {
        // Second to last sample with no rise after it
        w[i] = w[i - 1];
    }
}

/// Apply the peak correction to one waveform, given as a `[channel, sample]` view.
pub fn peak_correction(mut waveform: ArrayViewMut2<'_, u16>) -> Result<(), CorrectionError> {
    let (channels, samples) = waveform.dim();
    if channels < DRS4_NUMBER_OF_CHANNELS || samples < DRS4_NUMBER_OF_CELLS {
        return Err(CorrectionError::BadGeometry { channels, samples });
    }

    let mut wfs: Vec<Vec<i32>> = (0..DRS4_NUMBER_OF_CHANNELS)
        .map(|ch| {
            waveform
                .row(ch)
                .iter()
                .take(DRS4_NUMBER_OF_CELLS)
                .map(|&v| i32::from(v))
                .collect()
        })
        .collect();
    let means: Vec<f64> = wfs
        .iter()
        .map(|w| w.iter().map(|&v| v as f64).sum::<f64>() / DRS4_NUMBER_OF_CELLS as f64)
        .collect();

    for i in 1..DRS4_NUMBER_OF_CELLS {
        let mut offset = 0;
        let mut offset_plus = 0;
        for (w, mean) in wfs.iter().zip(means.iter()) {
            if discontinuity_vote(w, i) {
                offset += 1;
            }
            if sustained_low_vote(w, i, *mean) {
                offset_plus += 1;
            }
        }

        if offset >= PEAK_MAJORITY {
            for w in wfs.iter_mut() {
                repair_discontinuity(w, i);
            }
        }
        if offset_plus >= PEAK_MAJORITY {
            for (w, mean) in wfs.iter_mut().zip(means.iter()) {
                let fill = mean.round() as i32;
                w[i..i + PEAK_SUSTAINED_WINDOW].fill(fill);
            }
        }
    }

    for (ch, w) in wfs.iter().enumerate() {
        for (s, value) in w.iter().enumerate() {
            waveform[[ch, s]] = (*value).clamp(0, u16::MAX as i32) as u16;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    const BASELINE: u16 = 1000;

    fn flat() -> Array2<u16> {
        Array2::from_elem((DRS4_NUMBER_OF_CHANNELS, DRS4_NUMBER_OF_CELLS), BASELINE)
    }

    #[test]
    fn test_synchronized_dip_is_removed() {
        let mut grid = flat();
        for ch in 0..8 {
            grid[[ch, 500]] = BASELINE - 31;
        }
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, flat());
    }

    #[test]
    fn test_minority_dip_is_kept() {
        let mut grid = flat();
        grid[[2, 500]] = BASELINE - 31;
        grid[[5, 500]] = BASELINE - 31;
        let expected = grid.clone();
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, expected);
    }

    #[test]
    fn test_majority_dip_is_removed() {
        let mut grid = flat();
        for ch in 0..7 {
            grid[[ch, 321]] = BASELINE - 45;
        }
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, flat());
    }

    #[test]
    fn test_small_dip_is_kept() {
        let mut grid = flat();
        for ch in 0..8 {
            grid[[ch, 500]] = BASELINE - 30;
        }
        let expected = grid.clone();
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, expected);
    }

    #[test]
    fn test_two_sample_dip() {
        let mut grid = flat();
        for ch in 0..8 {
            grid[[ch, 300]] = BASELINE - 40;
            grid[[ch, 301]] = BASELINE - 38;
        }
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, flat());
    }

    #[test]
    fn test_first_and_last_samples() {
        let mut grid = flat();
        for ch in 0..8 {
            grid[[ch, 1]] = BASELINE - 40;
            grid[[ch, DRS4_NUMBER_OF_CELLS - 1]] = BASELINE - 50;
        }
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, flat());
    }

    #[test]
    fn test_two_sample_dip_at_start() {
        let mut grid = flat();
        for ch in 0..8 {
            grid[[ch, 0]] = BASELINE + 10;
            grid[[ch, 1]] = BASELINE - 40;
            grid[[ch, 2]] = BASELINE - 40;
        }
        peak_correction(grid.view_mut()).unwrap();
        // Samples 0..=2 all take the value of sample 3
        assert_eq!(grid, flat());
    }

    #[test]
    fn test_second_to_last_without_rise() {
        let last = DRS4_NUMBER_OF_CELLS - 1;
        let mut grid = flat();
        for ch in 0..7 {
            grid[[ch, last - 1]] = BASELINE - 40;
        }
        grid[[7, last - 1]] = BASELINE - 100;
        grid[[7, last]] = BASELINE - 100;
        peak_correction(grid.view_mut()).unwrap();
        for ch in 0..7 {
            assert_eq!(grid[[ch, last - 1]], BASELINE);
            assert_eq!(grid[[ch, last]], BASELINE);
        }
        // No rise after the dip, so the previous sample is copied
        assert_eq!(grid[[7, last - 1]], BASELINE);
        assert_eq!(grid[[7, last]], BASELINE - 100);
    }

    #[test]
    fn test_sustained_low_window() {
        let mut grid = flat();
        for ch in 0..8 {
            for s in 600..606 {
                grid[[ch, s]] = 900;
            }
        }
        peak_correction(grid.view_mut()).unwrap();
        // mean = 1000 - 600 / 1024
        for ch in 0..8 {
            for s in 600..606 {
                assert_eq!(grid[[ch, s]], 999);
            }
            assert_eq!(grid[[ch, 599]], BASELINE);
            assert_eq!(grid[[ch, 606]], BASELINE);
        }
    }

    #[test]
    fn test_sustained_low_minority_is_kept() {
        let mut grid = flat();
        for s in 600..606 {
            grid[[0, s]] = 900;
            grid[[1, s]] = 900;
        }
        let expected = grid.clone();
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid, expected);
    }

    #[test]
    fn test_extra_channels_untouched() {
        let mut grid = Array2::from_elem((9, DRS4_NUMBER_OF_CELLS), BASELINE);
        for ch in 0..9 {
            grid[[ch, 500]] = BASELINE - 31;
        }
        peak_correction(grid.view_mut()).unwrap();
        assert_eq!(grid[[0, 500]], BASELINE);
        assert_eq!(grid[[8, 500]], BASELINE - 31);
    }

    #[test]
    fn test_bad_geometry() {
        let mut grid = Array2::from_elem((4, DRS4_NUMBER_OF_CELLS), BASELINE);
        assert!(matches!(
            peak_correction(grid.view_mut()),
            Err(CorrectionError::BadGeometry { channels: 4, .. })
        ));
    }
}
