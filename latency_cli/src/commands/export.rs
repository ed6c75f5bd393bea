use super::{parse_profile, Context};
use crate::ui;
use anyhow::Result;
use clap::ValueEnum;
use latency_core::CategoryFilter;
use latency_summary::{JsonExporter, MarkdownExporter, PrometheusExporter};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
    Prometheus,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
            ExportFormat::Prometheus => "prom",
        }
    }
}

pub async fn execute(
    ctx: &Context,
    profile: String,
    filter: Option<CategoryFilter>,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let recorder = ctx.recorder().await?;

    let filter = match filter {
        Some(filter) => filter,
        None => recorder.filter(&profile).await?,
    };

    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}_logs.{}",
            profile.host().replace(':', "_"),
            format.extension()
        ))
    });
    let to_stdout = path.as_os_str() == "-";

    match format {
        ExportFormat::Json => {
            let payload = recorder.export(&profile, &filter).await?;
            if to_stdout {
                println!("{}", JsonExporter::to_string(&payload)?);
            } else {
                JsonExporter::export(&payload, &path).await?;
            }
        }
        ExportFormat::Markdown => {
            let rows = recorder.list(&profile, &filter).await?;
            if to_stdout {
                println!("{}", MarkdownExporter::format(&profile, &filter, &rows));
            } else {
                MarkdownExporter::export(&profile, &filter, &rows, &path).await?;
            }
        }
        ExportFormat::Prometheus => {
            let rows = recorder.list(&profile, &filter).await?;
            if to_stdout {
                println!("{}", PrometheusExporter::format(&profile, &rows));
            } else {
                PrometheusExporter::export(&profile, &rows, &path).await?;
            }
        }
    }

    if !to_stdout {
        ui::print_success(&format!("Exported {} ({}) to {}", profile, filter, path.display()));
    }
    Ok(())
}
