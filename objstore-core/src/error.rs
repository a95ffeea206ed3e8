use thiserror::Error;

use crate::object_id::ObjectId;

/// The crate's sole error type. Every public operation returns
/// [`Result`], and variants map directly onto the error kinds the
/// object engine is specified to surface.
#[derive(Error, Debug)]
pub enum ObjectEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("invalid object id {id:?}: {reason}")]
    InvalidObjectId { id: String, reason: String },

    #[error("invalid compression header in blob (expected codec header id {expected}, got {got})")]
    InvalidCompressionHeader { expected: u32, got: u32 },

    #[error("invalid indirect object: {0}")]
    InvalidIndirectObject(String),

    #[error(
        "chunk length mismatch for {id:?}: seek table declared {declared} bytes, got {actual}"
    )]
    ChunkLengthMismatch {
        id: ObjectId,
        declared: u64,
        actual: u64,
    },

    #[error("compressor already registered: {0}")]
    CompressorAlreadyRegistered(String),

    #[error("splitter already registered: {0}")]
    SplitterAlreadyRegistered(String),

    #[error("unknown compressor: {0}")]
    UnknownCompressor(String),

    #[error("unknown splitter: {0}")]
    UnknownSplitter(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("object is not parallelizable (not a multi-chunk indirect object)")]
    NotParallelizable,

    #[error("encountered {0} errors")]
    Aggregate(usize),
}

pub type Result<T> = std::result::Result<T, ObjectEngineError>;
