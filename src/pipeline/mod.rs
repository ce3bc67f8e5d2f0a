// Enrichment pipeline: normalization, resolution, feature enrichment, join, export

pub mod enricher;
pub mod export;
pub mod normalize;
pub mod orchestrator;
pub mod resolver;

// Re-export key types and functions from each stage
pub use enricher::{enrich_library, EnrichStats};
pub use normalize::normalize;
pub use orchestrator::{
    build_library, count_unmapped, join_events, unmapped_tracks, DatasetBundle, ScrobblePipeline,
};
pub use resolver::{resolve_library, ResolveStats};
