//! Stream filters.
//!
//! Only the filters that carry document structure are implemented: object
//! streams and cross-reference streams are almost always `FlateDecode` with a
//! PNG predictor, and the ASCII filters show up in hand-edited files. Image
//! codecs are never needed to locate or check a signature.

use crate::error::{Error, Result};

mod ascii85;
mod ascii_hex;
mod flate;
mod predictor;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on the output of any single stream.
pub const MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

/// A single PDF stream filter.
pub trait StreamDecoder {
    /// Decode `input`.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in `/Filter`.
    fn name(&self) -> &str;
}

fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    match name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder::new(MAX_DECODED_SIZE))),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        "ASCII85Decode" | "A85" => Ok(Box::new(Ascii85Decoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Run `data` through `filters` in order, then undo the predictor in `params`.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter in filters {
        let decoder = decoder_for(filter)?;
        current = decoder.decode(&current)?;
        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "{} output exceeds {} bytes",
                decoder.name(),
                MAX_DECODED_SIZE
            )));
        }
        log::trace!("{} produced {} bytes", decoder.name(), current.len());
    }

    match params {
        Some(params) if params.predictor > 1 => decode_predictor(&current, params),
        _ => Ok(current),
    }
}
