//! Candle-backed CLIP implementation of the inference model traits.
//!
//! Runs CLIP (Contrastive Language-Image Pre-Training) locally through the
//! HuggingFace Candle framework. Weights are downloaded from the
//! HuggingFace Hub on first load and cached on disk. Requires the
//! `embeddings-multimodal` feature.

use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::clip;
use hf_hub::api::sync::ApiBuilder;
use tokenizers::Tokenizer;

use crate::error::{Result, VisuraError};
use crate::model::inference::{ModelLoader, VisionLanguageModel};
use crate::vector::EmbeddingVector;

/// CLIP image normalization constants (ImageNet-style).
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.2686295, 0.2613026, 0.2757771];

/// A loaded CLIP model with its tokenizer and preprocessing pipeline.
///
/// Text and images embed into the same vector space, so a text query can
/// rank catalog images directly. All outputs are L2-normalized.
pub struct CandleClipModel {
    text_model: clip::text_model::ClipTextTransformer,
    vision_model: clip::vision_model::ClipVisionTransformer,
    text_projection: Linear,
    vision_projection: Linear,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    model_id: String,
    image_size: usize,
}

impl std::fmt::Debug for CandleClipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleClipModel")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl CandleClipModel {
    /// Load a CLIP model from the HuggingFace Hub.
    ///
    /// `model_id` is a hub identifier such as `openai/clip-vit-base-patch32`.
    /// Weights land in the standard HuggingFace cache directory
    /// (`$HF_HOME`, falling back to `~/.cache/huggingface`).
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::cuda_if_available(0)
            .map_err(|e| VisuraError::model_load(format!("device setup failed: {e}")))?;

        let cache_dir = std::env::var("HF_HOME")
            .or_else(|_| std::env::var("HOME").map(|home| format!("{home}/.cache/huggingface")))
            .unwrap_or_else(|_| "/tmp/huggingface".to_string());

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.into())
            .build()
            .map_err(|e| VisuraError::model_load(format!("hub api initialization failed: {e}")))?;
        let repo = api.model(model_id.to_string());

        let config = clip::ClipConfig::vit_base_patch32();

        // Prefer safetensors, fall back to the pytorch checkpoint.
        let weights_filename = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| VisuraError::model_load(format!("weights download failed: {e}")))?;

        let vb = if weights_filename.to_string_lossy().ends_with(".safetensors") {
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)
                    .map_err(|e| {
                        VisuraError::model_load(format!("var builder creation failed: {e}"))
                    })?
            }
        } else {
            VarBuilder::from_pth(&weights_filename, DType::F32, &device)
                .map_err(|e| VisuraError::model_load(format!("var builder creation failed: {e}")))?
        };

        let text_model =
            clip::text_model::ClipTextTransformer::new(vb.pp("text_model"), &config.text_config)
                .map_err(|e| VisuraError::model_load(format!("text model load failed: {e}")))?;

        let vision_model = clip::vision_model::ClipVisionTransformer::new(
            vb.pp("vision_model"),
            &config.vision_config,
        )
        .map_err(|e| VisuraError::model_load(format!("vision model load failed: {e}")))?;

        let projection_dim = config.text_config.projection_dim;

        // CLIP projection layers carry no bias.
        let text_projection = candle_nn::linear_no_bias(
            config.text_config.embed_dim,
            projection_dim,
            vb.pp("text_projection"),
        )
        .map_err(|e| VisuraError::model_load(format!("text projection load failed: {e}")))?;

        let vision_projection = candle_nn::linear_no_bias(
            config.vision_config.embed_dim,
            projection_dim,
            vb.pp("visual_projection"),
        )
        .map_err(|e| VisuraError::model_load(format!("vision projection load failed: {e}")))?;

        let tokenizer_filename = repo
            .get("tokenizer.json")
            .map_err(|e| VisuraError::model_load(format!("tokenizer download failed: {e}")))?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| VisuraError::model_load(format!("tokenizer load failed: {e}")))?;

        Ok(Self {
            text_model,
            vision_model,
            text_projection,
            vision_projection,
            tokenizer,
            device,
            dimension: projection_dim,
            model_id: model_id.to_string(),
            image_size: config.vision_config.image_size,
        })
    }

    /// Decode, resize and normalize image bytes into a CLIP input tensor.
    fn preprocess_image(&self, bytes: &[u8]) -> Result<Tensor> {
        use image::DynamicImage;

        let img = image::load_from_memory(bytes)
            .map_err(|e| VisuraError::decode(format!("image decode failed: {e}")))?;

        let img = img.resize_exact(
            self.image_size as u32,
            self.image_size as u32,
            image::imageops::FilterType::Triangle,
        );

        let img = match img {
            DynamicImage::ImageRgb8(img) => img,
            img => img.to_rgb8(),
        };

        let img_data = img.into_raw();
        let img_tensor =
            Tensor::from_vec(img_data, (self.image_size, self.image_size, 3), &self.device)
                .map_err(|e| VisuraError::embedding(e.to_string()))?;

        let mean = Tensor::new(&IMAGE_MEAN, &self.device)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .reshape((1, 1, 3))
            .map_err(|e| VisuraError::embedding(e.to_string()))?;
        let std = Tensor::new(&IMAGE_STD, &self.device)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .reshape((1, 1, 3))
            .map_err(|e| VisuraError::embedding(e.to_string()))?;

        // Scale to [0, 1], normalize, then permute to (1, C, H, W).
        let normalized = img_tensor
            .to_dtype(DType::F32)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .affine(1.0 / 255.0, 0.0)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .broadcast_sub(&mean)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .broadcast_div(&std)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .permute((2, 0, 1))
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .unsqueeze(0)
            .map_err(|e| VisuraError::embedding(e.to_string()))?;

        Ok(normalized)
    }

    /// L2-normalize a (1, dim) embedding tensor.
    fn normalize(&self, tensor: &Tensor) -> Result<Tensor> {
        let norm = tensor
            .sqr()
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .sum_keepdim(1)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .sqrt()
            .map_err(|e| VisuraError::embedding(e.to_string()))?;

        tensor
            .broadcast_div(&norm)
            .map_err(|e| VisuraError::embedding(e.to_string()))
    }

    fn tensor_to_vector(&self, tensor: &Tensor) -> Result<EmbeddingVector> {
        let data: Vec<f32> = tensor
            .squeeze(0)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .to_vec1()
            .map_err(|e| VisuraError::embedding(e.to_string()))?;
        Ok(EmbeddingVector::new(data))
    }
}

impl VisionLanguageModel for CandleClipModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<EmbeddingVector> {
        let image_tensor = self.preprocess_image(bytes)?;

        let vision_features = self
            .vision_model
            .forward(&image_tensor)
            .map_err(|e| VisuraError::embedding(format!("vision model forward failed: {e}")))?;

        let projected = self
            .vision_projection
            .forward(&vision_features)
            .map_err(|e| VisuraError::embedding(format!("vision projection failed: {e}")))?;

        let normalized = self.normalize(&projected)?;
        self.tensor_to_vector(&normalized)
    }

    fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| VisuraError::embedding(format!("tokenization failed: {e}")))?;
        let token_ids = encoding.get_ids();

        let token_ids_tensor = Tensor::new(token_ids, &self.device)
            .map_err(|e| VisuraError::embedding(e.to_string()))?
            .unsqueeze(0)
            .map_err(|e| VisuraError::embedding(e.to_string()))?;

        let text_features = self
            .text_model
            .forward(&token_ids_tensor)
            .map_err(|e| VisuraError::embedding(format!("text model forward failed: {e}")))?;

        let projected = self
            .text_projection
            .forward(&text_features)
            .map_err(|e| VisuraError::embedding(format!("text projection failed: {e}")))?;

        let normalized = self.normalize(&projected)?;
        self.tensor_to_vector(&normalized)
    }
}

/// [`ModelLoader`] that builds [`CandleClipModel`]s.
///
/// Loading downloads weights and initializes tensors, which can take tens
/// of seconds; it runs on the blocking thread pool so the async runtime
/// stays responsive.
#[derive(Debug, Default, Clone)]
pub struct CandleClipLoader;

impl CandleClipLoader {
    /// Create a loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelLoader for CandleClipLoader {
    async fn load(&self, model_id: &str) -> Result<Arc<dyn VisionLanguageModel>> {
        let model_id = model_id.to_string();
        let model = tokio::task::spawn_blocking(move || CandleClipModel::load(&model_id))
            .await
            .map_err(|e| VisuraError::model_load(format!("loader task failed: {e}")))??;
        Ok(Arc::new(model))
    }
}
