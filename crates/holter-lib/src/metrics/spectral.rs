use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

/// Normalised autocorrelation for lags `0..len`, computed through a
/// zero-padded FFT. `None` when the series has no variance.
pub fn autocorrelation(data: &[f64]) -> Option<Vec<f64>> {
    let n = data.len();
    if n == 0 {
        return None;
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let nfft = n.next_power_of_two() * 2;
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nfft);
    let c2r = planner.plan_fft_inverse(nfft);

    let mut frame = vec![0.0; nfft];
    for (slot, x) in frame.iter_mut().zip(data) {
        *slot = x - mean;
    }
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut frame, &mut spectrum).ok()?;
    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }
    let mut out = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut out).ok()?;
    let lag0 = out[0];
    if !(lag0.is_finite() && lag0 > 0.0) {
        return None;
    }
    Some(out[..n].iter().map(|v| v / lag0).collect())
}

/// One-sided rectangular-window periodogram of the mean-removed series,
/// zero-padded to the next power of two. Returns `(frequencies, power)`
/// with frequency in cycles per sample.
pub fn periodogram_rect(data: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = data.len();
    if n < 2 {
        return None;
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let nfft = n.next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(nfft);
    let mut frame = vec![0.0; nfft];
    for (slot, x) in frame.iter_mut().zip(data) {
        *slot = x - mean;
    }
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut frame, &mut spectrum).ok()?;

    let n_out = spectrum.len();
    let scale = 1.0 / n as f64;
    let power: Vec<f64> = spectrum
        .iter()
        .enumerate()
        .map(|(k, val)| {
            let p = val.norm_sqr() * scale;
            if k > 0 && k < n_out - 1 {
                2.0 * p
            } else {
                p
            }
        })
        .collect();
    let freqs = (0..n_out).map(|k| k as f64 / nfft as f64).collect();
    Some((freqs, power))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocorrelation_matches_direct_sum() {
        let data = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 2.0];
        let ac = autocorrelation(&data).unwrap();
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        let c: Vec<f64> = data.iter().map(|x| x - mean).collect();
        let lag0: f64 = c.iter().map(|x| x * x).sum();
        for lag in 0..data.len() {
            let direct: f64 = (0..data.len() - lag).map(|i| c[i] * c[i + lag]).sum::<f64>() / lag0;
            assert!((ac[lag] - direct).abs() < 1e-9, "lag {lag}");
        }
    }

    #[test]
    fn constant_series_has_no_autocorrelation() {
        assert!(autocorrelation(&[2.0; 8]).is_none());
    }

    #[test]
    fn periodogram_peaks_at_signal_frequency() {
        let data: Vec<f64> = (0..64)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / 8.0).sin())
            .collect();
        let (freqs, power) = periodogram_rect(&data).unwrap();
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert!((freqs[peak] - 0.125).abs() < 1e-12);
    }
}
