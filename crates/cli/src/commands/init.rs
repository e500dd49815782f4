//! `lotline init`: write a starter config file.

use lotline_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Path::new("lotline.toml");

    println!("Lotline Setup");
    println!("=============\n");

    if config_path.exists() {
        println!("⚠️  Config already exists at: ./{}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    let default_toml = AppConfig::default_toml();
    std::fs::write(config_path, &default_toml)?;
    println!("✅ Created ./{}", config_path.display());
    println!();
    println!("📝 Next steps:");
    println!("   1. Edit lotline.toml: point dataset.path at your delimited table");
    println!("      and dataset.instruction_path at the analyst instruction file.");
    println!("   2. Set an API key: export LOTLINE_API_KEY='...'");
    println!("      (AZURE_OPENAI_API_KEY and OPENAI_API_KEY also work.)");
    println!("   3. Run: lotline chat");
    println!();

    Ok(())
}
