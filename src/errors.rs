use crate::input::Location;
use thiserror::Error;

/// Everything that can stop a compilation. All variants are fatal; the first
/// one raised terminates the run with no output.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown word `{1}` at {0}")]
    UnknownWord(Location, String),

    #[error("unexpected end of stream at {0}")]
    UnexpectedEndOfStream(Location),

    #[error("no such file `{1}` at {0}")]
    NoSuchFile(Location, String),

    #[error("stack underflow at `{1}` at {0}")]
    StackUnderflow(Location, String),

    #[error("stack not empty at end of input at {0}")]
    StackNotEmpty(Location),

    #[error("{0} at {1}")]
    Parse(String, Location),
}

pub type Result<T> = std::result::Result<T, CompileError>;
