pub mod config;
pub mod dataset;
pub mod embedder;
pub mod export;
pub mod ranker;
pub mod store;
pub mod vector_ops;
