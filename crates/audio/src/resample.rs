use voice_agent_core::SampleRate;

/// Convert `pcm16` from `source_rate` to `target_rate` by linear
/// interpolation (spec §4.1). Identity passthrough when the rates match.
/// Never fails: a malformed input (odd byte length) is returned unchanged
/// and recorded as a metric rather than propagated as an error.
pub fn resample(pcm16: &[u8], source_rate: SampleRate, target_rate: SampleRate) -> Vec<u8> {
    if source_rate == target_rate {
        return pcm16.to_vec();
    }

    if pcm16.len() % 2 != 0 {
        metrics::counter!("resampler_errors_total").increment(1);
        tracing::warn!(len = pcm16.len(), "resample: odd-length pcm16 buffer, passthrough");
        return pcm16.to_vec();
    }

    let samples: Vec<i16> = pcm16
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    if samples.is_empty() {
        return Vec::new();
    }

    let source_hz = source_rate.hz() as f64;
    let target_hz = target_rate.hz() as f64;
    let ratio = target_hz / source_hz;
    let out_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;

    let mut out = Vec::with_capacity(out_len * 2);
    let last_index = samples.len() - 1;

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx0 = src_pos.floor() as usize;
        let idx0 = idx0.min(last_index);
        let idx1 = (idx0 + 1).min(last_index);
        let frac = src_pos - idx0 as f64;

        let s0 = samples[idx0] as f64;
        let s1 = samples[idx1] as f64;
        let interpolated = s0 + (s1 - s0) * frac;
        let sample = interpolated.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;

        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}
