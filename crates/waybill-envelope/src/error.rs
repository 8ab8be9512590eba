//! Envelope-level error taxonomy

use thiserror::Error;

/// Errors raised while constructing, parsing, or mutating an envelope.
///
/// These map onto the `Malformed` and `Protocol` kinds of the broader error
/// taxonomy; transport and repository errors live in their own crates.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Bytes failed to deserialize into a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// `advance` was called on an envelope whose itinerary is already empty.
    #[error("cannot advance: itinerary is empty")]
    EmptyItinerary,

    /// An itinerary edit would push `inserted_count` past the configured bound.
    #[error("insertion bound exceeded: {attempted} inserted steps would exceed max_insertions={max}")]
    InsertBoundExceeded {
        /// Total insertions this edit would produce if allowed.
        attempted: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// An itinerary edit names an agent already present in `executed` for this run.
    #[error("cyclic insertion: agent '{agent_name}' already executed in this run")]
    CyclicInsertion {
        /// The offending agent name.
        agent_name: String,
    },
}
