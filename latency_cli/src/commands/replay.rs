use super::Context;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use latency_session::{parse_trace_from_file, ReplayRunner};
use std::path::PathBuf;

pub async fn execute(ctx: &Context, trace_file: PathBuf, report_json: Option<PathBuf>) -> Result<()> {
    ui::print_header("Replay Trace");
    println!("Loading trace: {}", trace_file.display());

    let events = parse_trace_from_file(&trace_file).await?;
    let (config, recorder) = ctx.open().await?;
    println!("  Events: {}", events.len());
    println!("  Session: {}", recorder.session_id());

    let pb = ProgressBar::new(events.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} events")?
            .progress_chars("=>-"),
    );

    let runner = ReplayRunner::new(recorder).with_reaper(config.reaper.clone());
    let report = runner
        .run_with_progress(events, |handled| pb.set_position(handled as u64))
        .await?;
    pb.finish_and_clear();

    println!("\n{}", "Replay Results:".bold());
    println!("  Recorded observations: {}", report.recorded.to_string().green());
    println!("  Requests registered: {}", report.registered);
    println!("  Filtered (scheme): {}", report.filtered);
    println!("  Rejected (malformed): {}", report.rejected);
    println!("  Untracked completions: {}", report.untracked);
    println!("  Failed requests: {}", report.failed);
    println!("  Evicted (no completion): {}", report.evicted);
    println!("  Still in flight: {}", report.still_in_flight);
    println!("  Elapsed: {:?}", report.elapsed);

    if report.dropped > 0 {
        ui::print_warning(&format!(
            "{} observations were dropped ({:.1}% recorded)",
            report.dropped,
            report.record_rate() * 100.0
        ));
    }

    println!("\n{}", "Profiles touched:".bold());
    for profile in &report.profiles {
        println!("  {} {}", "•".green(), profile);
    }

    if let Some(path) = report_json {
        println!("\nSaving replay report to: {}", path.display());
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&path, json).await?;
    }

    ui::print_success("Replay complete");
    Ok(())
}
