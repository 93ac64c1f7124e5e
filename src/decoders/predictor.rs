//! Predictor reversal for `/DecodeParms`.
//!
//! Cross-reference and object streams are usually written with a PNG predictor
//! (`/Predictor 12`, one tag byte per row). TIFF predictor 2 is handled for
//! 8-bit components.

use crate::error::{Error, Result};

/// Predictor parameters from a `/DecodeParms` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// 1 = none, 2 = TIFF, 10..=15 = PNG
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("unsupported predictor {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let mut out = data.to_vec();

    for row in out.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }

    Ok(out)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let stride = row_len + 1;

    if row_len == 0 || data.len() % stride != 0 {
        return Err(Error::Decode(format!(
            "predicted data length {} is not a multiple of row size {}",
            data.len(),
            stride
        )));
    }

    let mut out: Vec<u8> = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for encoded in data.chunks(stride) {
        let (tag, encoded) = (encoded[0], &encoded[1..]);
        let mut row = vec![0u8; row_len];

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(Error::Decode(format!("invalid PNG row tag {}", other))),
            };
            row[i] = encoded[i].wrapping_add(predicted);
        }

        out.extend_from_slice(&row);
        prev = row;
    }

    Ok(out)
}
