use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeenError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Config: {0}")]
    Config(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Shape mismatch: expected k={k} n={n}, got k={other_k} n={other_n}")]
    ShapeMismatch {
        k: usize,
        n: usize,
        other_k: usize,
        other_n: usize,
    },

    #[error("Hasher mismatch: snapshot tag {found:#010x}, expected {expected:#010x}")]
    HasherMismatch { expected: u32, found: u32 },

    #[error("Bad magic or version")]
    BadHeader,

    #[error("Corrupt snapshot")]
    Corrupt,
}

pub type Result<T> = std::result::Result<T, SeenError>;
