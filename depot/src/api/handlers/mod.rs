pub mod probes;
pub mod static_assets;
pub mod upload;
