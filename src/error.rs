use std::fmt;

#[derive(Debug)]
pub enum ChipboxError {
    Codec(CodecError),
    Json(JsonError),
    Io(std::io::Error),
}

/// Hard failures of the song-string decoder. Anything past the header
/// degrades to defaults instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Empty,
    UnsupportedVersion { variant: char, version: u32 },
}

#[derive(Debug)]
pub enum JsonError {
    Parse(serde_json::Error),
    NotAnObject,
}

impl fmt::Display for ChipboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipboxError::Codec(e) => write!(f, "Song string error: {e}"),
            ChipboxError::Json(e) => write!(f, "Song JSON error: {e}"),
            ChipboxError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ChipboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChipboxError::Codec(e) => Some(e),
            ChipboxError::Json(e) => Some(e),
            ChipboxError::Io(e) => Some(e),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Empty => write!(f, "Empty song string"),
            CodecError::UnsupportedVersion { variant, version } => {
                write!(f, "Unsupported song string version '{variant}' {version}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonError::Parse(e) => write!(f, "Invalid JSON: {e}"),
            JsonError::NotAnObject => write!(f, "Song JSON must be an object"),
        }
    }
}

impl std::error::Error for JsonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JsonError::Parse(e) => Some(e),
            JsonError::NotAnObject => None,
        }
    }
}

impl From<CodecError> for ChipboxError {
    fn from(e: CodecError) -> Self {
        ChipboxError::Codec(e)
    }
}

impl From<JsonError> for ChipboxError {
    fn from(e: JsonError) -> Self {
        ChipboxError::Json(e)
    }
}

impl From<std::io::Error> for ChipboxError {
    fn from(e: std::io::Error) -> Self {
        ChipboxError::Io(e)
    }
}

impl From<serde_json::Error> for JsonError {
    fn from(e: serde_json::Error) -> Self {
        JsonError::Parse(e)
    }
}
