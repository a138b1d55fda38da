use std::{
    collections::BTreeMap,
    fs::{create_dir_all, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::warn;

use crate::{
    error::CacheError,
    key::{fallback_description, image_label},
};

/// The descriptions of a single folder, indexed by image label.
pub type FolderDescriptions = BTreeMap<String, String>;

/// The description cache: folder key to the descriptions of that folder.
pub type ImageDescriptionData = BTreeMap<String, FolderDescriptions>;

/// Reads the description cache, distinguishing a missing file from a broken one.
///
/// # Returns
///
/// `None` when the file does not exist, the parsed cache otherwise.
pub fn try_read_image_description_data(
    file_path: impl AsRef<Path>,
) -> Result<Option<ImageDescriptionData>, CacheError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Ok(None);
    }

    let reader = BufReader::new(File::open(file_path)?);
    let data = serde_json::from_reader(reader)?;

    Ok(Some(data))
}

/// Reads the description cache.
///
/// A missing file gives an empty cache. An unreadable or malformed file is reported
/// with a warning and also gives an empty cache.
pub fn read_image_description_data(file_path: impl AsRef<Path>) -> ImageDescriptionData {
    let file_path = file_path.as_ref();
    match try_read_image_description_data(file_path) {
        Ok(data) => data.unwrap_or_default(),
        Err(err) => {
            warn!(
                "Failed to read image description data file {}: {err}",
                file_path.display()
            );
            ImageDescriptionData::new()
        }
    }
}

/// Writes the description cache as JSON indented by two spaces.
///
/// Missing parent folders are created.
pub fn write_image_description_data(
    file_path: impl AsRef<Path>,
    data: &ImageDescriptionData,
) -> Result<(), CacheError> {
    let file_path = file_path.as_ref();
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(file_path)?);
    serde_json::to_writer_pretty(&mut writer, data)?;
    writer.flush()?;

    Ok(())
}

/// Looks up the description of an image.
///
/// # Arguments
///
/// * `data` - The description cache.
/// * `image_file_path` - The `/` separated path of the image, relative to the image root.
///
/// # Returns
///
/// The cached description, or the label with `_` and `-` turned into spaces when
/// there is no non-empty cached description.
pub fn lookup_description(data: &ImageDescriptionData, image_file_path: &str) -> String {
    let (folder, file_name) = match image_file_path.rfind('/') {
        Some(slash_index) => image_file_path.split_at(slash_index + 1),
        None => ("", image_file_path),
    };
    let label = image_label(file_name);

    data.get(folder)
        .and_then(|descriptions| descriptions.get(&label))
        .filter(|description| !description.is_empty())
        .cloned()
        .unwrap_or_else(|| fallback_description(&label))
}
