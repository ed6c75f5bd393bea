use crate::ui;
use anyhow::Result;
use colored::Colorize;
use latency_core::Category;

pub async fn execute() -> Result<()> {
    ui::print_header("Endpoint Categories");

    for category in Category::ALL {
        println!("  {} {}", "•".green(), category);
    }

    println!(
        "\n{}",
        "Use 'latency filter <profile> <CATEGORY>...' to select categories".yellow()
    );

    Ok(())
}
