use super::{parse_profile, Context};
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use latency_core::CategoryFilter;

pub async fn execute(ctx: &Context, profile: String, categories: Vec<String>) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let recorder = ctx.recorder().await?;

    if categories.is_empty() {
        let filter = recorder.filter(&profile).await?;
        println!("Filter for {}: {}", profile, filter.to_string().yellow());
        return Ok(());
    }

    let filter: CategoryFilter = categories
        .join(",")
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    recorder.set_filter(&profile, filter.clone()).await?;

    let count = recorder.badge_count(&profile).await?;
    ui::print_success(&format!(
        "Filter for {} set to {} ({} matching endpoints)",
        profile, filter, count
    ));
    Ok(())
}
