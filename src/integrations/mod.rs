pub mod api_target;
pub mod csv_loader;
pub mod ollama;

pub use api_target::{ApiTarget, DryRunTarget, HttpApiTarget};
pub use csv_loader::{load_csv_path, load_csv_reader, LoadedCsv};
pub use ollama::OllamaOracle;
