//! `lotline chat`: interactive Q&A or single-question mode.

use lotline_analyst::{Analyst, AskScope};
use lotline_config::AppConfig;
use lotline_core::message::History;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    message: Option<String>,
    years: Option<Vec<i32>>,
    head: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for an API key early and explain how to set one
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export LOTLINE_API_KEY='...'          (generic)");
        eprintln!("    export AZURE_OPENAI_API_KEY='...'     (for Azure OpenAI)");
        eprintln!("    export OPENAI_API_KEY='sk-...'        (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    ./lotline.toml  (run `lotline init` to create one)");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let gateway = lotline_providers::build_from_config(&config.gateway)?;
    let analyst = Analyst::new(config, gateway);
    let scope = AskScope {
        years,
        head_rows: head,
    };

    if let Some(question) = message {
        // Single question mode
        let history = History::new();
        eprint!("  Thinking...");
        let result = analyst.ask_scoped(&question, &history, &scope).await;
        eprint!("\r              \r");
        println!("{}", result?.text);
        return Ok(());
    }

    // Interactive mode: prepare the dataset up front so the banner can
    // show what the answers will be grounded on.
    let summary = analyst.summary().await?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Lotline Production Analyst          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Backend:   {}", analyst.gateway_name());
    println!("  Model:     {}", analyst.config().gateway.model);
    println!(
        "  Dataset:   {} rows, {}",
        summary.rows,
        summary.period_span()
    );
    println!("  Years:     {:?}", summary.years);
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit, '/clear' to reset the history.");
    println!();

    let mut history = History::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let question = line.trim();

        if question.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if matches!(question, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }
        if question == "/clear" {
            history.clear();
            println!("  (history cleared)");
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        eprint!("  ...");

        match analyst.ask_scoped(question, &history, &scope).await {
            Ok(answer) => {
                eprint!("\r     \r");
                println!();
                for line in answer.text.lines() {
                    println!("  Analyst > {line}");
                }
                println!();
                history.push_exchange(question, answer.text);
            }
            Err(e) => {
                // One failed turn should not end the session
                tracing::warn!("Exchange failed: {e}");
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
