//! Input level metering.

/// Level of a capture window as the mean absolute amplitude, 0.0 to 1.0.
/// An empty window reads as silence.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn window_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
    mean.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_silent() {
        assert_eq!(window_level(&[]), 0.0);
    }

    #[test]
    fn silence_reads_zero() {
        assert_eq!(window_level(&[0.0; 256]), 0.0);
    }

    #[test]
    fn full_scale_square_wave_reads_one() {
        let samples: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((window_level(&samples) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn level_is_clamped_against_clipping_input() {
        assert_eq!(window_level(&[2.0; 16]), 1.0);
    }

    #[test]
    fn louder_windows_read_higher() {
        let quiet = vec![0.05_f32; 128];
        let loud = vec![0.5_f32; 128];
        assert!(window_level(&loud) > window_level(&quiet));
    }
}
