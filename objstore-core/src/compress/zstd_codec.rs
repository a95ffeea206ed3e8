use std::io::Write;

use crate::error::Result;

use super::Compressor;

pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn header_id(&self) -> u32 {
        1
    }

    fn encode(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let mut enc = zstd::stream::Encoder::new(Vec::new(), 3)?;
        enc.write_all(input)?;
        out.extend_from_slice(&enc.finish()?);
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::stream::decode_all(input)?)
    }
}
