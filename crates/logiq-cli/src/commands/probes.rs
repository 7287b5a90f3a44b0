//! `logiq probes`: print the effective probe catalog in the order probes
//! are tried, with the log roots scanned for each flavor.

use anyhow::Result;
use logiq_core::{Classification, MatchMode};

use crate::config::Config;

pub async fn run(cfg: &Config) -> Result<()> {
    let catalog = cfg.catalog()?;
    match &cfg.scan.catalog {
        Some(path) => println!("Catalog: {}", path.display()),
        None => println!("Catalog: built-in"),
    }
    println!();

    println!(
        "{:<6} {:<10} {:<9} {:<24} {}",
        "RANK", "FLAVOR", "ELEVATED", "EXPECT", "COMMANDS"
    );
    for probe in catalog.probes() {
        let mode = match probe.expect.mode {
            MatchMode::Contains => "contains",
            MatchMode::Regex => "regex",
            MatchMode::Exact => "exact",
        };
        let expect = format!("{mode}: {}", probe.expect.patterns.join(", "));
        println!(
            "{:<6} {:<10} {:<9} {:<24} {}",
            probe.rank,
            probe.tag,
            if probe.elevated { "yes" } else { "no" },
            expect,
            probe.commands.join(" ; ")
        );
    }

    println!();
    println!("{:<10} {}", "FLAVOR", "LOG ROOTS");
    for probe in catalog.probes() {
        let roots = catalog.roots_for(&Classification::Matched(probe.tag.clone()));
        println!("{:<10} {}", probe.tag, roots.join(", "));
    }
    println!("{:<10} {}", "Unknown", catalog.default_paths().join(", "));
    println!();
    println!("Archives ending in '{}' are skipped.", catalog.archive_suffix());
    if let Some(filter) = catalog.name_filter() {
        println!("Only files matching /{}/ are listed.", filter.as_str());
    }

    Ok(())
}
