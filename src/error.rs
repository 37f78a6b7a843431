use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for the simulation core.
///
/// Each variant carries enough context to be actionable: numeric failures
/// name the event kind and the participating particles, configuration
/// failures name the offending element or attribute.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical failure mid-run (NaN event time, infinite dt on a
    /// scheduled event, degenerate contact normal).
    #[error("numerical error: {0}")]
    Numeric(String),

    /// Malformed configuration document, missing attribute or unknown
    /// plugin type. Fatal at load.
    #[error("configuration error: {0}")]
    Config(String),

    /// The top of the event queue is a NONE event; the simulation has
    /// nothing left to run. Fatal.
    #[error("the simulation has run out of events: {0}")]
    EventExhaustion(String),

    /// Propagated XML parse errors.
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    /// Propagated I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
