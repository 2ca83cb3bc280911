use thiserror::Error;

/// Errors surfaced while parsing a compound file.
#[derive(Error, Debug)]
pub enum OleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an OLE2 structured storage file: {0}")]
    NotOle(String),

    #[error("invalid OLE header: {0}")]
    Format(String),

    #[error("structural error: {0}")]
    Structural(String),

    #[error("sector {sector} out of range")]
    SectorOutOfRange { sector: u32 },

    #[error("incomplete sector {sector}: read {got} bytes")]
    TruncatedSector { sector: u32, got: usize },

    #[error("malformed DIFAT: {0}")]
    MalformedDifat(String),

    #[error("stream too large: {sectors} sectors against a {fat_len}-entry table")]
    StreamTooLarge { sectors: u64, fat_len: usize },

    #[error("incomplete stream: {0}")]
    IncompleteStream(String),

    #[error("incorrect chain termination: last pointer {last:#010X}")]
    IncorrectChainTermination { last: u32 },

    #[error("directory entry {sid} out of range")]
    EntryOutOfRange { sid: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a stream: {0}")]
    NotAStream(String),
}

pub type Result<T> = std::result::Result<T, OleError>;
