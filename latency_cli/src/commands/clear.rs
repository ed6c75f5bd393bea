use super::{parse_profile, Context};
use crate::ui;
use anyhow::Result;

pub async fn execute(ctx: &Context, profile: String) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let recorder = ctx.recorder().await?;

    recorder.clear_logs(&profile).await?;
    ui::print_success(&format!("Cleared logs for {}", profile));
    Ok(())
}
