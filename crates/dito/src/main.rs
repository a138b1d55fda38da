use std::path::{Path, PathBuf};

use argh::FromArgs;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use dito_core::{
    find_image_files, pending_image_files, read_image_description_data,
    update_image_description_data, write_image_description_data, CacheError, ImageDescriber,
    ImageDescriptionData, UpdateStep, FALLBACK_DESCRIPTION,
};
use dito_vlm::{Blip, BlipConfig};

#[derive(FromArgs, Debug)]
/// Describe the new images of a folder and store the descriptions in a JSON file.
struct Args {
    /// path to the folder containing the images
    #[argh(positional)]
    image_folder_path: PathBuf,

    /// path to the JSON image description data file
    #[argh(positional)]
    image_description_data_file_path: PathBuf,

    /// hugging face repository of the BLIP model
    #[argh(option)]
    model_id: Option<String>,

    /// revision of the repository holding the weights
    #[argh(option)]
    revision: Option<String>,

    /// local safetensors weights of the model
    #[argh(option)]
    weights: Option<PathBuf>,

    /// local tokenizer.json of the model
    #[argh(option)]
    tokenizer: Option<PathBuf>,

    /// maximum length of a description in tokens
    #[argh(option)]
    max_length: Option<usize>,

    /// number of beams used to decode a description
    #[argh(option)]
    num_beams: Option<usize>,

    /// longest image edge fed to the model
    #[argh(option)]
    max_image_size: Option<u32>,

    /// seed of the token sampler
    #[argh(option)]
    seed: Option<u64>,

    /// hide the progress bar
    #[argh(switch)]
    no_progress: bool,
}

impl Args {
    fn blip_config(&self) -> BlipConfig {
        let mut config = BlipConfig::default();
        if let Some(model_id) = &self.model_id {
            config.model_id = model_id.clone();
        }
        if let Some(revision) = &self.revision {
            config.revision = revision.clone();
        }
        config.weights_path = self.weights.clone();
        config.tokenizer_path = self.tokenizer.clone();
        if let Some(max_image_size) = self.max_image_size {
            config.max_image_size = max_image_size;
        }
        let generation = &mut config.generation;
        if let Some(max_length) = self.max_length {
            generation.max_length = max_length;
        }
        if let Some(num_beams) = self.num_beams {
            generation.num_beams = num_beams.max(1);
        }
        if let Some(seed) = self.seed {
            generation.seed = seed;
        }
        config
    }
}

/// Advances the progress bar after each generated description.
struct ProgressDescriber<D> {
    inner: Option<D>,
    bar: ProgressBar,
}

impl<D: ImageDescriber> ImageDescriber for ProgressDescriber<D> {
    fn describe(&mut self, image_path: &Path) -> String {
        let description = match &mut self.inner {
            Some(describer) => describer.describe(image_path),
            None => FALLBACK_DESCRIPTION.to_string(),
        };
        self.bar.inc(1);
        description
    }
}

fn progress_bar(len: usize, hidden: bool) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    // drawn next to the phase lines, hidden when stdout is not a terminal
    let pb = ProgressBar::with_draw_target(Some(len as u64), ProgressDrawTarget::stdout());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta})")?
            .progress_chars("##>-"),
    );
    Ok(pb)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if !args.image_folder_path.is_dir() {
        return Err(CacheError::InvalidImageFolder(args.image_folder_path).into());
    }

    println!("Reading image folder...");
    let image_file_paths = find_image_files(&args.image_folder_path)?;

    println!("Reading image description data file...");
    let old_data = read_image_description_data(&args.image_description_data_file_path);

    let pending = pending_image_files(&image_file_paths, &old_data);
    log::info!(
        "{} images found, {} to describe",
        image_file_paths.len(),
        pending.len()
    );

    // the model is only loaded when there is something to describe
    let blip = if pending.is_empty() {
        None
    } else {
        println!("Reading AI model...");
        Some(Blip::new(args.blip_config())?)
    };

    let bar = progress_bar(pending.len(), args.no_progress || pending.is_empty())?;
    let mut describer = ProgressDescriber {
        inner: blip,
        bar: bar.clone(),
    };

    println!("Updating image description data...");
    let (data, summary) = update_image_description_data(
        &image_file_paths,
        ImageDescriptionData::new(),
        &old_data,
        &args.image_folder_path,
        &mut describer,
        |step| match step {
            UpdateStep::Keeping(path) => {
                bar.suspend(|| println!("Keeping image description : {path}"))
            }
            UpdateStep::Generating(path) => {
                bar.suspend(|| println!("Generating image description : {path}"))
            }
            UpdateStep::Duplicate(path) => {
                log::warn!("Skipping {path}: an image with the same name was already described")
            }
        },
    );
    bar.finish_and_clear();

    println!("Writing image description data file...");
    write_image_description_data(&args.image_description_data_file_path, &data)?;

    log::info!(
        "{} kept, {} generated, {} skipped",
        summary.kept,
        summary.generated,
        summary.duplicates
    );
    println!("Done!");

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use argh::FromArgs;

    use dito_core::read_image_description_data;

    use super::{progress_bar, run, Args};

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["dito"], args).expect("valid arguments")
    }

    #[test]
    fn defaults_come_from_the_model_config() {
        let config = parse(&["images", "descriptions.json"]).blip_config();
        let defaults = dito_vlm::BlipConfig::default();

        assert_eq!(config.model_id, defaults.model_id);
        assert_eq!(config.generation.num_beams, 5);
        assert_eq!(config.generation.max_length, 50);
        assert_eq!(config.max_image_size, 384);
    }

    #[test]
    fn options_override_the_config() {
        let config = parse(&[
            "images",
            "descriptions.json",
            "--num-beams",
            "0",
            "--max-length",
            "20",
            "--weights",
            "model.safetensors",
        ])
        .blip_config();

        assert_eq!(config.generation.num_beams, 1);
        assert_eq!(config.generation.max_length, 20);
        assert_eq!(
            config.weights_path.as_deref(),
            Some(std::path::Path::new("model.safetensors"))
        );
    }

    #[test]
    fn two_positional_arguments_are_required() {
        assert!(Args::from_args(&["dito"], &["images"]).is_err());
        assert!(Args::from_args(&["dito"], &["a", "b", "c"]).is_err());
    }

    fn cached_args(image_folder_path: &Path, cache_path: &Path) -> Args {
        let mut args = parse(&["images", "descriptions.json", "--no-progress"]);
        args.image_folder_path = image_folder_path.to_path_buf();
        args.image_description_data_file_path = cache_path.to_path_buf();
        // never reached when every image is cached
        args.weights = Some(image_folder_path.join("missing.safetensors"));
        args.tokenizer = Some(image_folder_path.join("missing.json"));
        args
    }

    #[test]
    fn fully_cached_folder_is_rewritten_without_the_model() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let images = tmp_dir.path().join("images");
        fs::create_dir_all(&images)?;
        fs::write(images.join("cat.png"), b"")?;
        let cache_path = tmp_dir.path().join("descriptions.json");
        fs::write(
            &cache_path,
            r#"{"": {"cat": "a cat"}, "gone/": {"dog": "a dog"}}"#,
        )?;

        run(cached_args(&images, &cache_path))?;

        let data = read_image_description_data(&cache_path);
        assert_eq!(data.len(), 1);
        assert_eq!(data[""].get("cat").map(String::as_str), Some("a cat"));
        Ok(())
    }

    #[test]
    fn uncached_image_loads_the_model() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let images = tmp_dir.path().join("images");
        fs::create_dir_all(&images)?;
        fs::write(images.join("cat.png"), b"")?;
        let cache_path = tmp_dir.path().join("descriptions.json");

        // the local model files do not exist
        assert!(run(cached_args(&images, &cache_path)).is_err());
        assert!(!cache_path.exists());
        Ok(())
    }

    #[test]
    fn folder_that_is_not_a_directory_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let not_a_folder = tmp_dir.path().join("cat.png");
        fs::write(&not_a_folder, b"")?;
        let cache_path = tmp_dir.path().join("descriptions.json");

        for path in [not_a_folder, tmp_dir.path().join("missing")] {
            let err = run(cached_args(&path, &cache_path))
                .err()
                .ok_or("run should fail")?;
            assert!(err.to_string().starts_with("Invalid image folder path : "));
        }
        assert!(!cache_path.exists());
        Ok(())
    }

    #[test]
    fn progress_bar_tracks_pending_images() -> Result<(), Box<dyn std::error::Error>> {
        assert!(progress_bar(3, true)?.is_hidden());
        assert_eq!(progress_bar(3, false)?.length(), Some(3));
        Ok(())
    }
}
