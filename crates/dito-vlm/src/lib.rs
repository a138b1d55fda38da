//! # dito VLM
//!
//! Image captioning with the Salesforce BLIP model running on candle.
//!
//! [`Blip::caption`] decodes an image, feeds it to the vision encoder and decodes a short
//! caption with beam search. [`Blip`] also implements [`dito_core::ImageDescriber`],
//! turning failures into [`dito_core::FALLBACK_DESCRIPTION`].
#![deny(missing_docs)]

/// Beam search over next-token log-probabilities.
pub mod beam;

/// Error types for the captioning model.
pub mod error;

/// Image decoding and conversion to the vision encoder input.
pub mod preprocessor;

/// Cleanup of decoded captions.
pub mod text_postprocessor;

mod model;

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Module};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::{BlipForConditionalGeneration, Config};
use dito_core::{ImageDescriber, FALLBACK_DESCRIPTION};
use hf_hub::{api::sync::Api, Repo, RepoType};
use log::{debug, error};
use tokenizers::Tokenizer;

use beam::BeamSearch;
pub use error::BlipError;
use model::TextGeneration;
use preprocessor::{image_to_tensor, limit_image_size, read_image_rgb8};
pub use text_postprocessor::clean_caption;

// the text decoder starts from [DEC] and stops at [SEP]
const BOS_TOKEN: &str = "[DEC]";
const BOS_TOKEN_ID: u32 = 30522;
const EOS_TOKEN: &str = "[SEP]";

/// Configuration of the caption decoding.
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    /// Maximum length of the token sequence, start token included.
    pub max_length: usize,
    /// Number of beams; `1` decodes token by token with the logits processor.
    pub num_beams: usize,
    /// Exponent of the length normalization of finished beams.
    pub length_penalty: f32,
    /// Seed of the logits processor.
    pub seed: u64,
    /// Sampling temperature when decoding with a single beam; `None` is greedy.
    pub temp: Option<f64>,
    /// Nucleus sampling threshold when decoding with a single beam.
    pub top_p: Option<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 50,
            num_beams: 5,
            length_penalty: 1.0,
            seed: 299792458,
            temp: None,
            top_p: None,
        }
    }
}

/// Configuration for the BLIP model.
#[derive(Debug, Clone)]
pub struct BlipConfig {
    /// Hugging Face repository of the model.
    pub model_id: String,
    /// Revision holding the safetensors weights.
    pub revision: String,
    /// Local weights, used instead of the hub when set.
    pub weights_path: Option<PathBuf>,
    /// Local tokenizer, used instead of the hub when set.
    pub tokenizer_path: Option<PathBuf>,
    /// Longest image edge before the image is resized to the model input.
    pub max_image_size: u32,
    /// Caption decoding parameters.
    pub generation: GenerationConfig,
}

impl Default for BlipConfig {
    fn default() -> Self {
        Self {
            model_id: "Salesforce/blip-image-captioning-large".to_string(),
            revision: "refs/pr/18".to_string(),
            weights_path: None,
            tokenizer_path: None,
            max_image_size: preprocessor::MODEL_IMAGE_SIZE,
            generation: GenerationConfig::default(),
        }
    }
}

/// The BLIP image captioning model.
///
/// NOTE: to run the model with Cuda, you need to pass the `--features cuda` flag to the `cargo run` command.
pub struct Blip {
    model: BlipForConditionalGeneration,
    tokenizer: Tokenizer,
    logits_processor: LogitsProcessor,
    bos_token_id: u32,
    eos_token_id: u32,
    config: BlipConfig,
    device: Device,
    dtype: DType,
}

impl Blip {
    /// Create a new BLIP model, downloading the files from the hub when no local paths are set.
    pub fn new(config: BlipConfig) -> Result<Self, BlipError> {
        let (device, dtype) = select_device();

        let (model, tokenizer) = Self::load_model(&config, dtype, &device)?;

        let bos_token_id = tokenizer.token_to_id(BOS_TOKEN).unwrap_or(BOS_TOKEN_ID);
        let eos_token_id = tokenizer
            .token_to_id(EOS_TOKEN)
            .ok_or(BlipError::TokenNotFound(EOS_TOKEN))?;

        let generation = config.generation;
        let logits_processor = LogitsProcessor::new(generation.seed, generation.temp, generation.top_p);

        Ok(Self {
            model,
            tokenizer,
            logits_processor,
            bos_token_id,
            eos_token_id,
            config,
            device,
            dtype,
        })
    }

    /// Generate the caption of an image.
    ///
    /// # Arguments
    ///
    /// * `image_path` - The path of an image in any format supported by the `image` crate.
    ///
    /// # Returns
    ///
    /// The cleaned caption.
    pub fn caption(&mut self, image_path: impl AsRef<Path>) -> Result<String, BlipError> {
        let image = read_image_rgb8(image_path)?;
        let image = limit_image_size(image, self.config.max_image_size);
        let image_t = image_to_tensor(&image, self.dtype, &self.device)?;

        let image_embeds = self.model.vision_model().forward(&image_t)?;

        let generation = self.config.generation;
        let prompt = [self.bos_token_id];
        let mut text_generation = TextGeneration::new(&mut self.model, &image_embeds, &self.device);

        let start_gen = std::time::Instant::now();
        let tokens = if generation.num_beams > 1 {
            BeamSearch {
                num_beams: generation.num_beams,
                max_length: generation.max_length,
                length_penalty: generation.length_penalty,
                eos_token_id: self.eos_token_id,
            }
            .run(&mut text_generation, &prompt)?
        } else {
            text_generation.run_sampling(
                &prompt,
                self.eos_token_id,
                generation.max_length,
                &mut self.logits_processor,
            )?
        };
        self.model.reset_kv_cache();

        debug!(
            "{} tokens generated in {:.2?}",
            tokens.len(),
            start_gen.elapsed()
        );

        let text = self.tokenizer.decode(&tokens, true)?;

        Ok(clean_caption(&text))
    }

    fn load_model(
        config: &BlipConfig,
        dtype: DType,
        device: &Device,
    ) -> Result<(BlipForConditionalGeneration, Tokenizer), BlipError> {
        let weights_filename = match &config.weights_path {
            Some(weights_path) => weights_path.clone(),
            None => {
                debug!(
                    "Loading weights from HuggingFace Hub: {} ({})",
                    config.model_id, config.revision
                );
                Api::new()?
                    .repo(Repo::with_revision(
                        config.model_id.clone(),
                        RepoType::Model,
                        config.revision.clone(),
                    ))
                    .get("model.safetensors")?
            }
        };

        let tokenizer_filename = match &config.tokenizer_path {
            Some(tokenizer_path) => tokenizer_path.clone(),
            None => Api::new()?
                .model(config.model_id.clone())
                .get("tokenizer.json")?,
        };

        let tokenizer = Tokenizer::from_file(tokenizer_filename)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], dtype, device)? };
        let model = BlipForConditionalGeneration::new(&Config::image_captioning_large(), vb)?;

        Ok((model, tokenizer))
    }
}

// the BLIP text decoder builds its causal mask in f32, so the weights stay f32 on every device
fn select_device() -> (Device, DType) {
    #[cfg(feature = "cuda")]
    let device = match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("CUDA not available, defaulting to CPU: {e}");
            Device::Cpu
        }
    };

    #[cfg(all(feature = "metal", not(feature = "cuda")))]
    let device = match Device::new_metal(0) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("Metal not available, defaulting to CPU: {e}");
            Device::Cpu
        }
    };

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    let device = Device::Cpu;

    (device, DType::F32)
}

impl ImageDescriber for Blip {
    fn describe(&mut self, image_path: &Path) -> String {
        match self.caption(image_path) {
            Ok(caption) => caption,
            Err(err) => {
                error!(
                    "Error generating image description for {}: {err}",
                    image_path.display()
                );
                FALLBACK_DESCRIPTION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn default_config() {
        let config = BlipConfig::default();
        assert_eq!(config.generation.max_length, 50);
        assert_eq!(config.generation.num_beams, 5);
        assert_eq!(config.max_image_size, 384);
        assert!(config.weights_path.is_none());
    }

    #[test]
    fn weights_are_loaded_as_f32() {
        let (_device, dtype) = select_device();
        assert_eq!(dtype, DType::F32);
    }

    #[test]
    fn missing_local_tokenizer_is_an_error() {
        let tmp_dir = tempfile::tempdir().expect("tempdir");
        let config = BlipConfig {
            weights_path: Some(tmp_dir.path().join("model.safetensors")),
            tokenizer_path: Some(tmp_dir.path().join("tokenizer.json")),
            ..Default::default()
        };

        assert!(Blip::new(config).is_err());
    }

    // cargo test -p dito-vlm test_blip_caption -- --nocapture --ignored
    #[test]
    #[ignore = "Downloads the BLIP weights"]
    fn test_blip_caption() -> Result<(), BlipError> {
        let _ = env_logger::builder().is_test(true).try_init();

        let tmp_dir = tempfile::tempdir()?;
        let image_path: PathBuf = tmp_dir.path().join("blue.png");
        image::RgbImage::from_pixel(640, 480, image::Rgb([20, 60, 200])).save(&image_path)?;

        let mut blip = Blip::new(BlipConfig::default())?;
        let caption = blip.caption(&image_path)?;

        assert!(!caption.is_empty());
        assert!(!caption.ends_with('.'));

        // unreadable files fall back
        let missing = tmp_dir.path().join("missing.png");
        assert_eq!(blip.describe(&missing), FALLBACK_DESCRIPTION);

        Ok(())
    }
}
