use anyhow::Result;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

#[derive(Deserialize)]
pub struct SmsearchConfig {
    pub dataset_path: Option<String>,
    pub embeddings_dir: Option<String>,
    pub model_name: Option<String>,
    pub model_cache_dir: Option<String>,
    pub classes: Option<String>,
    pub top_k: Option<usize>,
    pub similarity_floor: Option<f64>,
}

impl SmsearchConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(SmsearchConfig {
            dataset_path: config.get("dataset_path").ok(),
            embeddings_dir: config.get("embeddings_dir").ok(),
            model_name: config.get("model_name").ok(),
            model_cache_dir: config.get("model_cache_dir").ok(),
            classes: config.get("classes").ok(),
            top_k: config.get("top_k").ok(),
            similarity_floor: config.get("similarity_floor").ok(),
        })
    }
}

pub struct State {
    pub dataset_path: String,
    pub embeddings_dir: String,
    pub model_name: String,
    pub model_cache_dir: String,
    pub classes: Vec<String>,
    pub top_k: usize,
    pub similarity_floor: f64,
}

impl State {
    pub fn new() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("smsearch_config").required(false))?;
            config.merge(Environment::with_prefix("SMSEARCH"))?;
        }

        let smsearch_config = SmsearchConfig::try_from(&config)?;

        let dataset_path = smsearch_config
            .dataset_path
            .or_else(|| env::var("SMSEARCH_DATASET_PATH").ok())
            .unwrap_or_else(|| "data/sms_dataset.csv".to_string());

        let embeddings_dir = smsearch_config
            .embeddings_dir
            .or_else(|| env::var("SMSEARCH_EMBEDDINGS_DIR").ok())
            .unwrap_or_else(|| "embeddings".to_string());

        let model_name = smsearch_config
            .model_name
            .or_else(|| env::var("SMSEARCH_MODEL_NAME").ok())
            .unwrap_or_else(|| "all-MiniLM-L6-v2".to_string());

        let model_cache_dir = smsearch_config
            .model_cache_dir
            .or_else(|| env::var("SMSEARCH_MODEL_CACHE_DIR").ok())
            .unwrap_or_else(|| "models".to_string());

        let classes = smsearch_config
            .classes
            .or_else(|| env::var("SMSEARCH_CLASSES").ok())
            .unwrap_or_else(|| "smishing,benign".to_string());
        let classes: Vec<String> = classes
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if classes.is_empty() {
            anyhow::bail!("SMSEARCH_CLASSES must name at least one class");
        }

        let top_k = smsearch_config
            .top_k
            .or_else(|| env::var("SMSEARCH_TOP_K").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(3);

        if top_k == 0 {
            anyhow::bail!("SMSEARCH_TOP_K must be a positive integer");
        }

        let similarity_floor = smsearch_config
            .similarity_floor
            .or_else(|| {
                env::var("SMSEARCH_SIMILARITY_FLOOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(-1.0);

        Ok(Self {
            dataset_path,
            embeddings_dir,
            model_name,
            model_cache_dir,
            classes,
            top_k,
            similarity_floor,
        })
    }

    pub fn print_config(&self) {
        println!("dataset_path={}", self.dataset_path);
        println!("embeddings_dir={}", self.embeddings_dir);
        println!("model_name={}", self.model_name);
        println!("model_cache_dir={}", self.model_cache_dir);
        println!("classes={}", self.classes.join(","));
        println!("top_k={}", self.top_k);
        println!("similarity_floor={}", self.similarity_floor);
    }
}

pub fn verbose_print(message: &str) {
    if env::var("SMSEARCH_VERBOSE").unwrap_or_else(|_| "false".to_string()) == "true" {
        eprintln!("{}", message);
    }
}
