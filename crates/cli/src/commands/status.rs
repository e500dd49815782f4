//! `lotline status`: show configuration and dataset health.

use lotline_config::{AppConfig, GatewayBackend, PayloadModeConfig};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let backend = match config.gateway.backend {
        GatewayBackend::Azure => "azure",
        GatewayBackend::Openai => "openai",
        GatewayBackend::Custom => "custom",
    };
    let payload_mode = match config.context.payload_mode {
        PayloadModeConfig::ByYear => "by-year",
        PayloadModeConfig::Head => "head",
    };

    println!("Lotline Status");
    println!("==============");
    match AppConfig::resolve_path() {
        Some(path) => println!("  Config file:   {}", path.display()),
        None => println!("  Config file:   none (built-in defaults)"),
    }
    println!("  Dataset:       {}", config.dataset.path.display());
    println!("  Instruction:   {}", config.dataset.instruction_path.display());
    println!(
        "  Cache:         {}",
        if config.dataset.cache { "enabled" } else { "disabled" }
    );
    println!("  Backend:       {backend}");
    println!("  Model:         {}", config.gateway.model);
    println!("  Temperature:   {}", config.gateway.temperature);
    println!("  Max tokens:    {}", config.gateway.max_tokens);
    println!("  Timeout:       {}s", config.gateway.timeout_secs);
    println!("  Retries:       {}", config.gateway.retries);
    println!("  History limit: {}", config.context.history_limit);
    println!("  Payload mode:  {payload_mode}");
    println!(
        "  API key:       {}",
        if config.has_api_key() { "present" } else { "missing" }
    );

    if !config.dataset.path.exists() {
        println!();
        println!("  ⚠️  Dataset file not found at the configured path");
    }
    if !config.dataset.instruction_path.exists() {
        println!();
        println!("  ⚠️  Instruction file not found at the configured path");
    }
    if !config.has_api_key() {
        println!();
        println!("  ⚠️  No API key. Set LOTLINE_API_KEY or edit the config file.");
    }

    Ok(())
}
