use flatbuffers::InvalidFlatbuffer;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    /// Input does not begin with the FGB magic bytes
    MissingMagicBytes,
    /// Header size prefix outside the accepted range
    IllegalHeaderSize(usize),
    /// Writer was finished without any features
    NoFeaturesWritten,
    /// Bounding box selection requires an indexed dataset
    NoIndex,
    /// Geometry type outside the supported set
    UnsupportedGeometryType(String),
    /// Column type outside the supported set
    UnsupportedColumnType(String),
    /// Spatial index argument or invariant violation
    Index(&'static str),
    IO(std::io::Error),
    InvalidFlatbuffer(InvalidFlatbuffer),
    #[cfg(feature = "http")]
    Http(String),
    #[cfg(feature = "http")]
    HttpStatus(u16),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingMagicBytes => f.write_str("Missing magic bytes"),
            Error::IllegalHeaderSize(size) => write!(f, "Illegal header size {size}"),
            Error::NoFeaturesWritten => f.write_str("No features written"),
            Error::NoIndex => f.write_str("Dataset has no spatial index"),
            Error::UnsupportedGeometryType(geom_type) => {
                write!(f, "Unsupported geometry type {geom_type}")
            }
            Error::UnsupportedColumnType(col_type) => {
                write!(f, "Unsupported column type {col_type}")
            }
            Error::Index(description) => description.fmt(f),
            Error::IO(io) => io.fmt(f),
            Error::InvalidFlatbuffer(invalid_flatbuffer) => invalid_flatbuffer.fmt(f),
            #[cfg(feature = "http")]
            Error::Http(description) => description.fmt(f),
            #[cfg(feature = "http")]
            Error::HttpStatus(status) => write!(f, "HTTP status {status}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IO(value)
    }
}

impl From<InvalidFlatbuffer> for Error {
    fn from(value: InvalidFlatbuffer) -> Self {
        Error::InvalidFlatbuffer(value)
    }
}

impl From<Error> for geozero::error::GeozeroError {
    fn from(value: Error) -> Self {
        geozero::error::GeozeroError::Feature(value.to_string())
    }
}
