//! `lotline dataset`: load the master table and print what came out.

use lotline_config::AppConfig;
use lotline_dataset::{enrich, load, summarize};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let table = load(&config.dataset)?;
    let report = table.report;
    let records = enrich(table.records);
    let summary = summarize(&records);

    println!("Lotline Dataset");
    println!("===============");
    println!("  Source:        {}", config.dataset.path.display());
    println!("  Delimiter:     {:?}", report.delimiter as char);
    println!("  Columns:       {}", report.columns.join(", "));
    println!("  Rows:          {}", report.rows);
    println!("  Dropped:       {}", report.dropped);
    println!(
        "  Loaded from:   {}",
        if report.from_cache { "cache" } else { "source file" }
    );
    println!("  Digest:        {}", report.digest);
    println!();
    println!("  Period span:   {}", summary.period_span());
    println!("  Years:         {:?}", summary.years);
    println!("  Substances:    {}", summary.substances);
    println!("  Presentations: {}", summary.presentations);
    println!("  Lines:         {}", summary.lines);
    println!("  Families:      {}", summary.families);

    Ok(())
}
