//! JARVIS - Entry Point
//!
//! Line-oriented front end over stdio: every input line is one turn, every
//! reply is printed as `[source] response`. Lines starting with `:` are
//! memory-editor commands.

use jarvis_core::{Collection, Engine, EngineConfig, EngineError, SessionContext};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_output = args.iter().any(|a| a == "--json" || a == "-j");

    if help_mode {
        print_help();
        return Ok(());
    }

    // Log to stderr so stdout carries replies only
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        })
        .unwrap_or(Level::WARN);
    let json_logs = std::env::var("JARVIS_LOG_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("JARVIS v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env()?;
    let engine = Engine::open(&config)?;
    info!(
        "Data dir {} ({} storage)",
        config.data_dir.display(),
        engine.backend_name()
    );

    let mut session = SessionContext::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        let input = line.trim();

        let output = if let Some(command) = input.strip_prefix(':') {
            match run_command(&engine, command).await? {
                Some(text) => text,
                None => break,
            }
        } else {
            let resolution = engine.resolve(input, &session).await?;
            session = resolution.session.clone();
            if json_output {
                serde_json::to_string(&resolution)?
            } else {
                format!("[{}] {}", resolution.source_tag, resolution.response)
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    if let Err(e) = engine.flush().await {
        warn!("Final flush failed: {}", e);
    }
    Ok(())
}

/// Memory-editor commands. `None` means quit.
async fn run_command(engine: &Engine, command: &str) -> anyhow::Result<Option<String>> {
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    let text = match name {
        "quit" | "exit" | "q" => return Ok(None),
        "stats" => serde_json::to_string_pretty(&engine.stats().await)?,
        "patterns" => {
            let patterns = engine.list_patterns().await;
            if patterns.is_empty() {
                "No patterns learned yet.".to_string()
            } else {
                patterns
                    .iter()
                    .map(|p| {
                        let status = match p.override_active {
                            Some(true) => " [override]",
                            Some(false) => " [override, inactive]",
                            None => "",
                        };
                        format!(
                            "{} x{}{}: {}",
                            p.key,
                            p.total_frequency,
                            status,
                            p.sample.as_deref().unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        "override" => match rest.split_once('=') {
            Some((phrase, answer)) if !answer.trim().is_empty() => operator_reply(
                engine.set_override(phrase, answer.trim()).await,
                OVERRIDE_USAGE,
                |key| format!("Override set for {}", key),
            )?,
            _ => OVERRIDE_USAGE.to_string(),
        },
        "deactivate" => operator_reply(
            engine.deactivate_override(rest).await,
            "Usage: :deactivate <phrase or key>",
            |found| {
                if found {
                    "Override deactivated.".to_string()
                } else {
                    "No override for that pattern.".to_string()
                }
            },
        )?,
        "delete" => operator_reply(
            engine.delete_override(rest).await,
            "Usage: :delete <phrase or key>",
            |found| {
                if found {
                    "Override deleted.".to_string()
                } else {
                    "No override for that pattern.".to_string()
                }
            },
        )?,
        "dump" => match collection_named(rest) {
            Some(collection) => engine.render_collection(collection).await?,
            None => "Usage: :dump patterns|word_associations|taught_answers|custom_overrides|predictor"
                .to_string(),
        },
        "predict" => {
            let p = engine.predict(rest).await;
            format!("{} ({:.0}%)", p.intent, p.confidence_percent)
        }
        _ => {
            "Commands: :stats :patterns :override :deactivate :delete :dump :predict :quit"
                .to_string()
        }
    };
    Ok(Some(text))
}

const OVERRIDE_USAGE: &str = "Usage: :override <phrase or key> = <answer>";

/// Bad operator input is reported inline; only store failures end the session
fn operator_reply<T>(
    result: Result<T, EngineError>,
    usage: &str,
    render: impl FnOnce(T) -> String,
) -> anyhow::Result<String> {
    match result {
        Ok(value) => Ok(render(value)),
        Err(EngineError::Config(reason)) => Ok(format!("{}\n{}", reason, usage)),
        Err(e) => Err(e.into()),
    }
}

fn collection_named(name: &str) -> Option<Collection> {
    Collection::ALL.into_iter().find(|c| c.as_str() == name)
}

fn print_help() {
    println!("JARVIS v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: jarvis [OPTIONS]");
    println!();
    println!("Reads one utterance per line from stdin and prints [source] reply.");
    println!();
    println!("Options:");
    println!("  --json, -j   Print each resolution as JSON");
    println!("  --help, -h   Show this help");
    println!();
    println!("Commands:");
    println!("  :stats                        Learning statistics");
    println!("  :patterns                     Learned patterns with override status");
    println!("  :override <phrase> = <reply>  Add or edit a custom override");
    println!("  :deactivate <phrase>          Deactivate an override");
    println!("  :delete <phrase>              Delete an override");
    println!("  :dump <collection>            Print a persisted collection");
    println!("  :predict <text>               Show the intent model's prediction");
    println!("  :quit                         Flush and exit");
    println!();
    println!("Environment variables:");
    println!("  JARVIS_DATA_DIR              Data directory");
    println!("  JARVIS_STORAGE               json | sqlite | memory (default: json)");
    println!("  JARVIS_RETRAIN_EVERY         Retrain after N new samples (default: 10)");
    println!("  JARVIS_ACCEPT_CONFIDENCE     Predictor acceptance, percent (default: 70)");
    println!("  JARVIS_MIN_TRAINING_SAMPLES  Minimum samples before predicting (default: 5)");
    println!("  JARVIS_TRAINING_WINDOW       Rolling window size (default: 100)");
    println!("  JARVIS_VOCAB_CAP             Vocabulary cap (default: 1000)");
    println!("  JARVIS_USER_NAME             How to address the user (default: Sir)");
    println!("  JARVIS_LOG_JSON              Log as JSON to stderr");
    println!("  RUST_LOG                     Log level (default: warn)");
}
