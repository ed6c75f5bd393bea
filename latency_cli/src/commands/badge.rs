use super::{parse_profile, Context};
use anyhow::Result;
use latency_summary::badge_text;

pub async fn execute(ctx: &Context, profile: String) -> Result<()> {
    let profile = parse_profile(&profile)?;
    let recorder = ctx.recorder().await?;

    let count = recorder.badge_count(&profile).await?;
    println!("{}", badge_text(count));
    Ok(())
}
