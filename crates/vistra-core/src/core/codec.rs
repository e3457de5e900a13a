use thiserror::Error;

/// Error raised by a content codec when a payload cannot be decoded or
/// encoded. Malformed payloads are per-node and retryable; they never abort
/// sibling loads or a whole archive read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed content payload: {reason}")]
    Malformed { reason: String },
}

impl CodecError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Opaque encode/decode seam between the engine and a node's domain payload.
///
/// The engine never inspects the representation `R`; it only moves byte
/// buffers in and out of this codec. Implementations must be shareable
/// across worker threads, since decodes run on the background pipeline.
pub trait ContentCodec<R>: Send + Sync {
    /// Decodes serialized payload bytes into the in-memory representation.
    fn decode(&self, bytes: &[u8]) -> Result<R, CodecError>;

    /// Serializes a representation back into its archive byte form.
    fn encode(&self, repr: &R) -> Result<Vec<u8>, CodecError>;
}

/// Identity codec for documents whose payloads are treated as raw bytes,
/// e.g. by inspection tooling that never materializes domain objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl ContentCodec<Vec<u8>> for BytesCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn encode(&self, repr: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(repr.clone())
    }
}
