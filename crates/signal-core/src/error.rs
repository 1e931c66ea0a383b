use thiserror::Error;

/// Failure modes of the external-source connectors. Trend collection does
/// not use this type; its failures travel as structured `CollectResult`s.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Source API error: {0}")]
    Api(String),

    #[error("Source response could not be decoded: {0}")]
    Decode(String),

    #[error("Source quota exhausted: {0}")]
    QuotaExhausted(String),
}
