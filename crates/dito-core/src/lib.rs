#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Recursive discovery of image files.
///
/// See [`discovery::find_image_files`].
pub mod discovery;

/// Error types for the cache and discovery operations.
pub mod error;

/// Folder keys and labels identifying an image inside the cache.
pub mod key;

/// Reading, writing and querying the JSON description cache.
pub mod store;

/// The incremental update of the description cache.
pub mod update;

pub use crate::discovery::{find_image_files, is_image_file, IMAGE_EXTENSIONS};
pub use crate::error::CacheError;
pub use crate::key::{fallback_description, folder_key, image_label, ImageKey};
pub use crate::store::{
    lookup_description, read_image_description_data, try_read_image_description_data,
    write_image_description_data, FolderDescriptions, ImageDescriptionData,
};
pub use crate::update::{
    pending_image_files, update_image_description_data, ImageDescriber, UpdateStep,
    UpdateSummary, FALLBACK_DESCRIPTION,
};
