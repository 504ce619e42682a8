//! Image processing pipeline components.
//!
//! - **discovery**: Find image files by extension allowlist
//! - **decode**: Size limits, signature check, decoding with a timeout
//! - **analyzer**: Scorer + detector for one image, tag selection
//! - **retry**: Retry classification and backoff for model calls
//! - **batch**: Order-preserving concurrent driver over a file list

pub mod analyzer;
pub mod batch;
pub mod decode;
pub mod discovery;
pub mod retry;

// Re-exports for convenient access
pub use analyzer::{select_tags, Analyzer, AnalyzerOptions};
pub use batch::BatchRunner;
pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::FileDiscovery;
