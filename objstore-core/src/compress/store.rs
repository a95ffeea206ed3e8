use crate::error::Result;

use super::Compressor;

/// Identity codec: writes bytes through unchanged. Always loses the
/// "strictly smaller" comparison at the call site, so it only ever
/// gets chosen as the writer's explicit fallback.
pub struct StoreCompressor;

impl Compressor for StoreCompressor {
    fn name(&self) -> &'static str {
        "store"
    }

    fn header_id(&self) -> u32 {
        0
    }

    fn encode(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}
