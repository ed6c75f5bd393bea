use super::Context;
use crate::ui;
use anyhow::Result;
use colored::Colorize;

pub async fn execute(ctx: &Context) -> Result<()> {
    let recorder = ctx.recorder().await?;
    let profiles = recorder.profiles().await?;

    ui::print_header("Recorded Profiles");
    if profiles.is_empty() {
        ui::print_info("Nothing recorded yet; try 'latency replay <trace>'");
        return Ok(());
    }

    for profile in profiles {
        let logs = recorder.get_profile_logs(&profile).await?;
        let filter = recorder.filter(&profile).await?;
        println!(
            "  {} {} ({} endpoints, filter {})",
            "•".green(),
            profile,
            logs.entries.len(),
            filter
        );
    }

    Ok(())
}
