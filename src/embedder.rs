use crate::config::{verbose_print, Number, State};
use anyhow::{Context, Result};
use fastembed::{InitOptions, TextEmbedding};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Capability of turning a text into a fixed-dimension vector. The ranking
/// core only depends on this seam, so tests can substitute synthetic vectors.
pub trait Embedder {
    fn encode(&self, text: &str) -> Result<Vec<Number>>;
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<Number>>>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Sentence-embedding model backed by fastembed's bundled ONNX runtime.
/// The inner `Mutex` is there because `TextEmbedding::embed` takes `&mut self`.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load (downloading on first use) the model named in `state`. Fails fast
    /// on unknown model names so a bad configuration never reaches ranking.
    pub fn load(state: &State) -> Result<Self> {
        let model_enum = parse_model_name(&state.model_name)?;

        let cache_dir = PathBuf::from(&state.model_cache_dir);
        fs::create_dir_all(&cache_dir).with_context(|| {
            format!(
                "failed to create model cache directory '{}'",
                cache_dir.display()
            )
        })?;

        verbose_print(&format!("Loading embedding model: {}", state.model_name));
        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);
        let mut model = TextEmbedding::try_new(options)
            .with_context(|| format!("failed to initialize model '{}'", state.model_name))?;

        let dimension = probe_dimension(&mut model)?;
        verbose_print(&format!("Model loaded ({} dimensions)", dimension));

        Ok(Self {
            model: Mutex::new(model),
            model_name: state.model_name.clone(),
            dimension,
        })
    }
}

impl Embedder for FastEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<Number>> {
        let mut batch = self.encode_batch(&[text.to_string()])?;
        batch
            .pop()
            .context("embedding model returned no vector for query")
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<Number>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("embedding model lock poisoned: {}", e))?;
        model
            .embed(texts.to_vec(), None)
            .context("embedding generation failed")
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "all-minilm-l12-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
        "paraphrase-multilingual-minilm-l12-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        _ => anyhow::bail!(
            "unknown embedding model '{}'; supported models: all-MiniLM-L6-v2, \
             all-MiniLM-L6-v2-q, all-MiniLM-L12-v2, paraphrase-multilingual-MiniLM-L12-v2",
            name
        ),
    }
}

fn probe_dimension(model: &mut TextEmbedding) -> Result<usize> {
    let probe = model
        .embed(vec!["probe"], None)
        .context("failed to probe model output dimension")?;
    probe
        .first()
        .map(|v| v.len())
        .context("embedding model returned no probe vector")
}
