pub mod config;
pub mod correction;
pub mod enrich;
pub mod fetch;
pub mod flags;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod rules;
pub mod stats;
pub mod upload;
pub mod weather;
pub mod zones;
