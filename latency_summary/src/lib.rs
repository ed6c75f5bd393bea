pub mod projector;
pub mod exporters;

pub use projector::{badge_text, display_key, ExportPayload, LatencyStats, SummaryProjector, SummaryRow};
pub use exporters::{JsonExporter, MarkdownExporter, PrometheusExporter};
