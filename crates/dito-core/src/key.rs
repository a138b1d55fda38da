use std::path::Path;

/// The location of a description inside the cache.
///
/// Descriptions are grouped by the folder of the image, relative to the image root,
/// and indexed by the image label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    /// The parent folder with a trailing `/`, or an empty string for the root.
    pub folder: String,
    /// The file name up to its first dot.
    pub label: String,
}

impl ImageKey {
    /// Builds the key of an image from its path relative to the image root.
    ///
    /// # Arguments
    ///
    /// * `relative_path` - The `/` separated path of the image.
    ///
    /// # Example
    ///
    /// ```
    /// use dito_core::ImageKey;
    ///
    /// let key = ImageKey::from_relative_path("animals/cats/tom.final.jpg");
    ///
    /// assert_eq!(key.folder, "animals/cats/");
    /// assert_eq!(key.label, "tom");
    /// ```
    pub fn from_relative_path(relative_path: &str) -> Self {
        Self {
            folder: folder_key(relative_path),
            label: image_label(relative_path),
        }
    }
}

/// Returns the folder key of a relative image path.
///
/// The key is the parent folder followed by a `/`, or the empty string when the
/// image sits directly in the root folder.
pub fn folder_key(relative_path: &str) -> String {
    let parent = Path::new(relative_path)
        .parent()
        .map(|parent| parent.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();

    if parent.is_empty() || parent == "." {
        String::new()
    } else {
        format!("{parent}/")
    }
}

/// Returns the label of an image: its file name up to the first dot.
pub fn image_label(path: impl AsRef<Path>) -> String {
    let file_name = path
        .as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match file_name.find('.') {
        Some(dot_index) => file_name[..dot_index].to_string(),
        None => file_name,
    }
}

/// Turns a label into a readable text, used when no description is cached.
pub fn fallback_description(label: &str) -> String {
    label.replace(['_', '-'], " ")
}
