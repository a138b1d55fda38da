use std::path::Path;

use log::warn;
use walkdir::WalkDir;

use crate::error::CacheError;

/// The lowercase file extensions recognized as images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["avif", "jpg", "jpeg", "png", "webp"];

/// Returns true when the last extension of the path is an image extension.
pub fn is_image_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Finds the image files below a folder.
///
/// The folder is walked recursively, entries sorted by file name inside each directory.
///
/// # Arguments
///
/// * `image_folder_path` - The root folder of the images.
///
/// # Returns
///
/// The paths of the images relative to the root folder, with `/` separators.
pub fn find_image_files(image_folder_path: impl AsRef<Path>) -> Result<Vec<String>, CacheError> {
    let root = image_folder_path.as_ref();
    if !root.is_dir() {
        return Err(CacheError::InvalidImageFolder(root.to_path_buf()));
    }

    let mut image_file_paths = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            // the root itself must be readable
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                warn!("Skipping unreadable entry below {}: {err}", root.display());
                continue;
            }
        };

        // follow symlinks to regular files
        if !entry.path().is_file() || !is_image_file(entry.path()) {
            continue;
        }

        let Ok(relative_path) = entry.path().strip_prefix(root) else {
            continue;
        };

        let relative_path = relative_path
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        image_file_paths.push(relative_path);
    }

    Ok(image_file_paths)
}
