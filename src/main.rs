// Judicial Entity Disambiguation - CLI
// jed <baseline|tag|update> <config.json>

use anyhow::{bail, Result};
use std::env;
use std::path::Path;

use jed::{pipeline, Mode, RunConfig};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: jed <baseline|tag|update> <config.json>");
        std::process::exit(2);
    }

    let mode = match args[1].as_str() {
        "baseline" => Mode::Baseline,
        "tag" | "tagging" => Mode::Tagging,
        "update" => Mode::Update,
        other => bail!("unknown mode '{}'; expected baseline, tag, or update", other),
    };

    let mut config = RunConfig::load(Path::new(&args[2]))?;
    if config.mode != mode {
        bail!(
            "config file declares mode '{}' but '{}' was requested",
            config.mode.as_str(),
            mode.as_str()
        );
    }

    println!("⚖️  Judicial Entity Disambiguation - {} run", mode.as_str());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(w) = &config.commission_window {
        println!("📅 Commission window: {} → {}", w.start, w.end);
    }
    println!("📂 Mentions: {}", config.mentions_path.display());
    println!("📂 Output:   {}", config.output_dir.display());

    let report = pipeline::run(&config)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Mentions loaded: {} ({} malformed rows skipped)",
        report.mentions_loaded, report.mentions_skipped
    );
    println!("✓ Resolution rows written: {}", report.rows_written);
    if report.duplicates_suppressed > 0 {
        println!("✓ Duplicate rows suppressed: {}", report.duplicates_suppressed);
    }
    println!("✓ Resolved: {}", report.resolved);
    println!("✓ Unresolved: {}", report.unresolved);
    println!("✓ Excluded (party/counsel): {}", report.excluded);
    println!("✓ Passages attributed: {}", report.passages);
    if report.minted > 0 {
        println!("✓ New entities minted: {}", report.minted);
    }
    println!("✓ Registry size: {} entities", report.registry_size);
    println!("\n🎉 {} run complete", mode.as_str());

    Ok(())
}
