use std::path::Path;

use log::debug;

use crate::{key::ImageKey, store::ImageDescriptionData};

/// The description returned when an image cannot be described.
pub const FALLBACK_DESCRIPTION: &str = "No description available.";

/// A source of image descriptions.
///
/// Implementors never fail: an image that cannot be described gets a fallback text,
/// typically [`FALLBACK_DESCRIPTION`].
pub trait ImageDescriber {
    /// Describes the image at the given path.
    fn describe(&mut self, image_path: &Path) -> String;
}

impl<F> ImageDescriber for F
where
    F: FnMut(&Path) -> String,
{
    fn describe(&mut self, image_path: &Path) -> String {
        self(image_path)
    }
}

/// What the update did with a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep<'a> {
    /// The description was taken from the previous cache.
    Keeping(&'a str),
    /// A new description is being generated.
    Generating(&'a str),
    /// Another image of the same folder with the same label was already handled.
    Duplicate(&'a str),
}

/// Counts of the steps taken by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Descriptions copied from the previous cache.
    pub kept: usize,
    /// Descriptions generated by the describer.
    pub generated: usize,
    /// Images skipped because their key was already filled.
    pub duplicates: usize,
}

impl UpdateSummary {
    fn record(&mut self, step: &UpdateStep<'_>) {
        match step {
            UpdateStep::Keeping(_) => self.kept += 1,
            UpdateStep::Generating(_) => self.generated += 1,
            UpdateStep::Duplicate(_) => self.duplicates += 1,
        }
    }
}

/// Returns the images of the list that have no description in the previous cache.
///
/// Images sharing a key with an earlier image of the list are not counted.
pub fn pending_image_files<'a>(
    image_file_paths: &'a [String],
    old_data: &ImageDescriptionData,
) -> Vec<&'a str> {
    let mut seen = std::collections::HashSet::new();
    image_file_paths
        .iter()
        .filter(|image_file_path| {
            let key = ImageKey::from_relative_path(image_file_path);
            let cached = old_data
                .get(&key.folder)
                .is_some_and(|descriptions| descriptions.contains_key(&key.label));
            seen.insert(key) && !cached
        })
        .map(String::as_str)
        .collect()
}

/// Fills the description cache for a list of images.
///
/// Each image keeps its description from `old_data` when there is one, otherwise the
/// describer is called. Images whose key is already present in `data` are skipped.
///
/// # Arguments
///
/// * `image_file_paths` - The images, relative to `image_folder_path`.
/// * `data` - The cache being built.
/// * `old_data` - The cache of the previous run.
/// * `image_folder_path` - The root folder of the images.
/// * `describer` - The source of new descriptions.
/// * `on_step` - Called for every image before it is handled.
///
/// # Returns
///
/// The filled cache and the counts of what was done.
pub fn update_image_description_data<D, S>(
    image_file_paths: &[String],
    mut data: ImageDescriptionData,
    old_data: &ImageDescriptionData,
    image_folder_path: impl AsRef<Path>,
    describer: &mut D,
    mut on_step: S,
) -> (ImageDescriptionData, UpdateSummary)
where
    D: ImageDescriber + ?Sized,
    S: FnMut(UpdateStep<'_>),
{
    let image_folder_path = image_folder_path.as_ref();
    let mut summary = UpdateSummary::default();

    for image_file_path in image_file_paths {
        let ImageKey { folder, label } = ImageKey::from_relative_path(image_file_path);

        let old_description = old_data
            .get(&folder)
            .and_then(|descriptions| descriptions.get(&label));

        let descriptions = data.entry(folder).or_default();

        let step = if descriptions.contains_key(&label) {
            UpdateStep::Duplicate(image_file_path)
        } else if old_description.is_some() {
            UpdateStep::Keeping(image_file_path)
        } else {
            UpdateStep::Generating(image_file_path)
        };

        summary.record(&step);
        on_step(step);

        match (step, old_description) {
            (UpdateStep::Duplicate(_), _) => {
                debug!("Skipping {image_file_path}: label {label:?} is already described");
            }
            (UpdateStep::Keeping(_), Some(description)) => {
                descriptions.insert(label, description.clone());
            }
            _ => {
                let description = describer.describe(&image_folder_path.join(image_file_path));
                descriptions.insert(label, description);
            }
        }
    }

    (data, summary)
}
