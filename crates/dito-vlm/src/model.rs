use candle_core::{DType, Device, Tensor, D};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::BlipForConditionalGeneration;

use crate::beam::TokenScorer;
use crate::error::BlipError;

/// Decodes text from the image embeddings of one image.
pub(crate) struct TextGeneration<'a> {
    model: &'a mut BlipForConditionalGeneration,
    image_embeds: &'a Tensor,
    device: &'a Device,
}

impl<'a> TextGeneration<'a> {
    pub fn new(
        model: &'a mut BlipForConditionalGeneration,
        image_embeds: &'a Tensor,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            image_embeds,
            device,
        }
    }

    // logits of the token following the given context, as f32 with shape [vocab]
    fn last_logits(&mut self, context: &[u32]) -> Result<Tensor, BlipError> {
        let input_ids = Tensor::new(context, self.device)?.unsqueeze(0)?;
        let logits = self
            .model
            .text_decoder()
            .forward(&input_ids, self.image_embeds)?;
        let logits = logits.squeeze(0)?;
        let logits = logits.get(logits.dim(0)? - 1)?.to_dtype(DType::F32)?;
        Ok(logits)
    }

    /// Generates tokens one at a time reusing the decoder cache.
    ///
    /// # Returns
    ///
    /// The generated tokens, without the prompt and the end token.
    pub fn run_sampling(
        &mut self,
        prompt: &[u32],
        eos_token_id: u32,
        max_length: usize,
        logits_processor: &mut LogitsProcessor,
    ) -> Result<Vec<u32>, BlipError> {
        self.model.reset_kv_cache();

        let mut tokens = prompt.to_vec();
        for index in 0..max_length.saturating_sub(prompt.len()) {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let logits = self.last_logits(&tokens[start_pos..])?;

            let next_token = logits_processor.sample(&logits)?;
            if next_token == eos_token_id {
                break;
            }
            tokens.push(next_token);
        }

        self.model.reset_kv_cache();

        Ok(tokens[prompt.len()..].to_vec())
    }
}

impl TokenScorer for TextGeneration<'_> {
    type Error = BlipError;

    // beams do not share a cache, so each prefix is decoded from scratch
    fn next_log_probs(&mut self, tokens: &[u32]) -> Result<Vec<f32>, BlipError> {
        self.model.reset_kv_cache();
        let logits = self.last_logits(tokens)?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec1::<f32>()?;
        if log_probs.is_empty() {
            return Err(BlipError::EmptyLogits);
        }
        Ok(log_probs)
    }
}
