//! JPEG glitch transform
//!
//! Corrupts a compressed frame in place before it is decoded. The transform
//! walks the JPEG marker structure and rewrites bytes inside three kinds of
//! segment, each with its own probability weight:
//!
//! - **Quantization tables** (DQT): table entries are replaced with random
//!   non-zero values. Produces blocky color and contrast shifts.
//! - **Huffman tables** (DHT): symbol values are replaced. Heavy damage,
//!   often smears the remainder of the frame.
//! - **Scan data**: entropy-coded bytes are replaced. Produces shifted and
//!   recolored blocks from the damage point onward.
//!
//! Marker bytes, segment lengths and `0xFF` stuffing are never touched, so
//! the output keeps a decodable structure. Whether the decoder accepts the
//! damaged tables is best effort.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::GlitchConfig;

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_DQT: u8 = 0xDB;
const MARKER_DHT: u8 = 0xC4;
const MARKER_TEM: u8 = 0x01;

#[inline]
fn is_restart(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

/// Bernoulli draw, with out-of-range probabilities clamped
#[inline]
fn chance(rng: &mut StdRng, probability: f32) -> bool {
    probability > 0.0 && rng.gen_bool(probability.min(1.0) as f64)
}

/// Probability-scaled JPEG corruption
#[derive(Debug, Clone)]
pub struct JpegGlitch {
    config: GlitchConfig,
    rng: StdRng,
}

impl JpegGlitch {
    pub fn new(config: GlitchConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Corrupt `bytes` in place
    ///
    /// `glitchiness` is clamped to [0, 1] and scales every segment weight.
    /// Returns the number of bytes that changed. Streams that do not start
    /// with a JPEG SOI marker are left alone.
    pub fn apply(&mut self, bytes: &mut [u8], glitchiness: f32) -> usize {
        let glitchiness = if glitchiness.is_nan() { 0.0 } else { glitchiness.clamp(0.0, 1.0) };
        if glitchiness == 0.0 || bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != MARKER_SOI {
            return 0;
        }

        let p_quant = glitchiness * self.config.quantization;
        let p_huffman = glitchiness * self.config.huffman;
        let p_scan = glitchiness * self.config.scan_data;

        let mut changed = 0;
        let mut pos = 2;

        while pos + 1 < bytes.len() {
            if bytes[pos] != 0xFF {
                log::debug!("glitch: lost marker sync at byte {}", pos);
                break;
            }

            let marker = bytes[pos + 1];
            if marker == 0xFF {
                // Fill byte
                pos += 1;
                continue;
            }
            if marker == MARKER_EOI {
                break;
            }
            if marker == MARKER_SOI || marker == MARKER_TEM || is_restart(marker) {
                pos += 2;
                continue;
            }

            if pos + 4 > bytes.len() {
                break;
            }
            let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            let body_start = pos + 4;
            let body_end = pos + 2 + length;
            if length < 2 || body_end > bytes.len() {
                break;
            }

            match marker {
                MARKER_DQT => {
                    changed += self.glitch_quantization(&mut bytes[body_start..body_end], p_quant);
                }
                MARKER_DHT => {
                    changed += self.glitch_huffman(&mut bytes[body_start..body_end], p_huffman);
                }
                MARKER_SOS => {
                    let scan_end = find_scan_end(bytes, body_end);
                    changed += self.glitch_scan(&mut bytes[body_end..scan_end], p_scan);
                    pos = scan_end;
                    continue;
                }
                _ => {}
            }

            pos = body_end;
        }

        changed
    }

    fn glitch_quantization(&mut self, body: &mut [u8], probability: f32) -> usize {
        let mut changed = 0;
        let mut i = 0;

        while i < body.len() {
            let precision16 = body[i] >> 4 != 0;
            let entry_size = if precision16 { 2 } else { 1 };
            let table_end = (i + 1 + 64 * entry_size).min(body.len());
            i += 1;

            while i + entry_size <= table_end {
                if chance(&mut self.rng, probability) {
                    // Low byte of a 16-bit entry, or the whole 8-bit entry
                    let slot = i + entry_size - 1;
                    let value = self.rng.r#gen::<u8>().max(1);
                    if body[slot] != value {
                        body[slot] = value;
                        changed += 1;
                    }
                }
                i += entry_size;
            }
            i = table_end;
        }

        changed
    }

    fn glitch_huffman(&mut self, body: &mut [u8], probability: f32) -> usize {
        let mut changed = 0;
        let mut i = 0;

        while i + 17 <= body.len() {
            let symbol_count: usize = body[i + 1..i + 17].iter().map(|&c| c as usize).sum();
            let symbols_start = i + 17;
            let symbols_end = (symbols_start + symbol_count).min(body.len());

            for symbol in &mut body[symbols_start..symbols_end] {
                if chance(&mut self.rng, probability) {
                    let value = self.rng.r#gen::<u8>();
                    if *symbol != value {
                        *symbol = value;
                        changed += 1;
                    }
                }
            }
            i = symbols_end;
        }

        changed
    }

    fn glitch_scan(&mut self, scan: &mut [u8], probability: f32) -> usize {
        let mut changed = 0;
        let mut i = 0;

        while i < scan.len() {
            if scan[i] == 0xFF {
                // Stuffed zero or restart marker follows, keep both bytes
                i += 2;
                continue;
            }
            if chance(&mut self.rng, probability) {
                let value = self.rng.r#gen::<u8>().min(0xFE);
                if scan[i] != value {
                    scan[i] = value;
                    changed += 1;
                }
            }
            i += 1;
        }

        changed
    }
}

impl Default for JpegGlitch {
    fn default() -> Self {
        Self::new(GlitchConfig::default())
    }
}

/// End of the entropy-coded segment starting at `start` (index of the next real marker)
fn find_scan_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == 0xFF {
            let next = bytes[i + 1];
            if next == 0x00 || is_restart(next) {
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameCodec, JpegCodec};
    use crate::image::ChannelLayout;

    fn encoded_gradient() -> Vec<u8> {
        let (w, h) = (32, 32);
        let mut pixels = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                pixels.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128, 255]);
            }
        }
        let mut encoded = Vec::new();
        JpegCodec
            .encode(&pixels, w, h, ChannelLayout::Rgba, 80, &mut encoded)
            .unwrap();
        encoded
    }

    fn segment_markers(bytes: &[u8]) -> Vec<(usize, u8)> {
        // Headers only: stop at the first scan
        let mut markers = Vec::new();
        let mut pos = 2;
        while pos + 4 <= bytes.len() && bytes[pos] == 0xFF {
            let marker = bytes[pos + 1];
            markers.push((pos, marker));
            if marker == MARKER_SOS {
                break;
            }
            let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            pos += 2 + length;
        }
        markers
    }

    #[test]
    fn test_zero_glitchiness_is_identity() {
        let original = encoded_gradient();
        let mut bytes = original.clone();
        let mut glitch = JpegGlitch::default();
        assert_eq!(glitch.apply(&mut bytes, 0.0), 0);
        assert_eq!(bytes, original);
    }

    #[test]
    fn test_non_jpeg_untouched() {
        let mut bytes = vec![1, 2, 3, 4, 5, 6];
        let mut glitch = JpegGlitch::new(GlitchConfig {
            quantization: 1.0,
            huffman: 1.0,
            scan_data: 1.0,
            seed: 9,
        });
        assert_eq!(glitch.apply(&mut bytes, 1.0), 0);
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_quantization_glitch_keeps_structure_and_decodes() {
        let original = encoded_gradient();
        let mut bytes = original.clone();
        let mut glitch = JpegGlitch::default();

        let changed = glitch.apply(&mut bytes, 1.0);
        assert!(changed > 0, "full glitchiness should rewrite table entries");
        assert_eq!(bytes.len(), original.len());
        assert_eq!(segment_markers(&bytes), segment_markers(&original));

        let mut clean = Vec::new();
        let mut damaged = Vec::new();
        JpegCodec.decode(&original, ChannelLayout::Rgba, &mut clean).unwrap();
        JpegCodec.decode(&bytes, ChannelLayout::Rgba, &mut damaged).unwrap();
        assert_eq!(clean.len(), damaged.len());
        assert_ne!(clean, damaged);
    }

    #[test]
    fn test_scan_glitch_never_writes_marker_bytes() {
        let original = encoded_gradient();
        let mut bytes = original.clone();
        let mut glitch = JpegGlitch::new(GlitchConfig {
            quantization: 0.0,
            huffman: 0.0,
            scan_data: 1.0,
            seed: 3,
        });

        assert!(glitch.apply(&mut bytes, 1.0) > 0);
        let original_ff = original.iter().filter(|&&b| b == 0xFF).count();
        let glitched_ff = bytes.iter().filter(|&&b| b == 0xFF).count();
        assert_eq!(original_ff, glitched_ff);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, MARKER_EOI]);
    }

    #[test]
    fn test_same_seed_same_damage() {
        let original = encoded_gradient();
        let mut a = original.clone();
        let mut b = original.clone();
        JpegGlitch::default().apply(&mut a, 0.5);
        JpegGlitch::default().apply(&mut b, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_weights_above_one_saturate() {
        let original = encoded_gradient();
        let mut bytes = original.clone();
        let mut glitch = JpegGlitch::new(GlitchConfig {
            quantization: 4.0,
            huffman: 0.0,
            scan_data: 0.0,
            seed: 11,
        });

        assert!(glitch.apply(&mut bytes, 1.0) > 0);
        assert_eq!(segment_markers(&bytes), segment_markers(&original));
    }

    #[test]
    fn test_find_scan_end_skips_stuffing_and_restarts() {
        let bytes = [0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD3, 0x56, 0xFF, 0xD9];
        assert_eq!(find_scan_end(&bytes, 0), 7);
    }
}
