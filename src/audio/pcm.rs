//! Float <-> 16-bit little-endian PCM conversion.

/// Encode normalized float samples as signed 16-bit little-endian PCM.
///
/// Samples are clamped to [-1, 1]. Positive values scale by 32767 and negative
/// values by 32768 so both ends of the i16 range are reachable without overflow.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode 16-bit little-endian PCM back to normalized floats.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            if value < 0 {
                value as f32 / 32768.0
            } else {
                value as f32 / 32767.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes_use_asymmetric_scale() {
        let bytes = encode_pcm16(&[1.0, -1.0, 0.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let bytes = encode_pcm16(&[3.5, -7.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    }

    #[test]
    fn test_little_endian_layout() {
        // 0.5 * 32767 = 16383 = 0x3FFF
        let bytes = encode_pcm16(&[0.5]);
        assert_eq!(bytes, vec![0xFF, 0x3F]);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        assert_eq!(decode_pcm16(&[0x00, 0x00, 0x7F]).len(), 1);
    }
}
