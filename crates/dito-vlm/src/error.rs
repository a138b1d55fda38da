/// An error type for the captioning model.
#[derive(thiserror::Error, Debug)]
pub enum BlipError {
    /// Failed to fetch the model files from the hub.
    #[error(transparent)]
    FailedToLoadModel(#[from] hf_hub::api::sync::ApiError),

    /// Error raised by a tensor operation.
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    /// Error loading the tokenizer or decoding tokens.
    #[error(transparent)]
    TokenizerError(#[from] tokenizers::Error),

    /// Error decoding an image.
    #[error(transparent)]
    ImageError(#[from] image::ImageError),

    /// Error reading a file.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// A special token is missing from the tokenizer.
    #[error("Cannot find the {0} token")]
    TokenNotFound(&'static str),

    /// The decoder returned empty logits.
    #[error("The decoder produced no candidate tokens")]
    EmptyLogits,
}
