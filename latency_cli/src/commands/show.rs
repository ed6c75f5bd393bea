use super::{parse_profile, Context};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use latency_core::CategoryFilter;
use latency_summary::{SummaryProjector, SummaryRow};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "#")]
    ordinal: u64,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Max (ms)")]
    latency_ms: u64,
}

impl From<&SummaryRow> for EndpointRow {
    fn from(row: &SummaryRow) -> Self {
        Self {
            ordinal: row.ordinal(),
            method: row.entry.method.clone(),
            category: row.category.to_string(),
            url: row.entry.url(),
            latency_ms: row.entry.latency_ms,
        }
    }
}

pub async fn execute(ctx: &Context, profile: String, filter: Option<CategoryFilter>) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let recorder = ctx.recorder().await?;

    let filter = match filter {
        Some(filter) => filter,
        None => recorder.filter(&profile).await?,
    };
    let logs = recorder.get_profile_logs(&profile).await?;
    let rows = logs.filtered(&filter);

    ui::print_header(&format!("Endpoints for {}", profile));
    println!("Filter: {}", filter.to_string().yellow());
    println!(
        "Showing {} of {} endpoints (next sequence {})",
        rows.len(),
        logs.entries.len(),
        logs.next_seq
    );

    if rows.is_empty() {
        ui::print_info("No endpoints recorded for this filter");
        return Ok(());
    }

    let table_rows: Vec<EndpointRow> = rows.iter().map(EndpointRow::from).collect();
    println!("\n{}", Table::new(table_rows).with(Style::rounded()));

    let stats = SummaryProjector::stats(&rows);
    println!(
        "\nWorst: {:?}  P95: {:?}  Average: {:?}",
        stats.max_latency, stats.latency_p95, stats.average_latency
    );

    Ok(())
}
