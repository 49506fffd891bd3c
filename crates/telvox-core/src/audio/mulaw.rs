//! G.711 mu-law companding
//!
//! Maps the full signed 16-bit range onto 8-bit codes with logarithmic
//! segments: fine steps near zero, coarse steps near full scale. Codes are
//! stored inverted, so zero amplitude encodes to `0xFF`.

use bytes::BytesMut;

/// Code for zero amplitude; also the padding byte for partial frames.
pub const SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode one linear sample.
pub fn encode(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let biased = magnitude.min(CLIP) + BIAS;

    // Segment = position of the highest set bit above bit 7 (0..=7).
    let exponent = 31 - ((biased >> 7) as u32).leading_zeros();
    let mantissa = (biased >> (exponent + 3)) & 0x0F;

    !(sign | ((exponent as i32) << 4) | mantissa) as u8
}

/// Decode one mu-law code back to a linear sample.
pub fn decode(code: u8) -> i16 {
    let code = !code;
    let sign = code & 0x80;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a run of samples, appending one byte per sample in order.
pub fn encode_into(samples: &[i16], out: &mut BytesMut) {
    out.reserve(samples.len());
    out.extend(samples.iter().map(|&s| encode(s)));
}
