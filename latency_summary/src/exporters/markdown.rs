use crate::projector::{LatencyStats, SummaryProjector, SummaryRow};
use anyhow::Result;
use latency_core::{CategoryFilter, Profile};
use std::path::Path;

pub struct MarkdownExporter;

impl MarkdownExporter {
    pub async fn export(
        profile: &Profile,
        filter: &CategoryFilter,
        rows: &[SummaryRow],
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let markdown = Self::format(profile, filter, rows);
        tokio::fs::write(path, markdown).await?;
        Ok(())
    }

    pub fn format(profile: &Profile, filter: &CategoryFilter, rows: &[SummaryRow]) -> String {
        let stats: LatencyStats = SummaryProjector::stats(rows);
        let table = rows
            .iter()
            .map(|row| {
                format!(
                    "| {} | {} | {} | `{}` | {} |",
                    row.ordinal(),
                    row.entry.method,
                    row.category,
                    row.entry.url().replace('|', "\\|"),
                    row.entry.latency_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"# Endpoint Latency Report: {}

Generated: {}
Filter: {}

## Summary

| Metric | Value |
|--------|-------|
| Endpoints | {} |
| P50 (worst per endpoint) | {:?} |
| P95 (worst per endpoint) | {:?} |
| Average | {:?} |
| Min | {:?} |
| Max | {:?} |

## Endpoints

| # | Method | Category | URL | Max latency (ms) |
|---|--------|----------|-----|------------------|
{}
"#,
            profile,
            chrono::Utc::now().to_rfc3339(),
            filter,
            stats.endpoints,
            stats.latency_p50,
            stats.latency_p95,
            stats.average_latency,
            stats.min_latency,
            stats.max_latency,
            table,
        )
    }
}
