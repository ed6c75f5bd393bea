pub mod json;
pub mod prometheus;
pub mod markdown;

pub use json::JsonExporter;
pub use prometheus::PrometheusExporter;
pub use markdown::MarkdownExporter;
