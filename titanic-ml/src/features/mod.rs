//! Feature store: group definitions, registry, ingestion and the local store.

pub mod definition;
pub mod ingest;
pub mod registry;
pub mod store;

pub use definition::{
    FeatureDefinition, FeatureGroupDescription, FeatureType, load_feature_definitions,
};
pub use ingest::{cast_object_to_string, ingest_options, prepare_for_ingestion};
pub use registry::FeatureRegistry;
pub use store::{FeatureStore, IngestOptions, IngestionReport, LocalFeatureStore, Record};
