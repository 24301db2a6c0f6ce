pub mod classifier;
pub mod format_service;
pub mod ingest_service;
pub mod pipeline;
pub mod thumbnail_service;
