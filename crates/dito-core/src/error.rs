/// An error type for the description cache and image discovery.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Error when the image folder does not exist or is not a directory.
    #[error("Invalid image folder path : {0}")]
    InvalidImageFolder(std::path::PathBuf),

    /// Error to walk the image folder.
    #[error("Failed to walk the image folder. {0}")]
    WalkError(#[from] walkdir::Error),

    /// Error to read or write the description file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// Error to parse or serialize the description file.
    #[error("Invalid image description data. {0}")]
    JsonError(#[from] serde_json::Error),
}
