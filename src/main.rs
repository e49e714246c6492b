use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use tracing::{info, warn};

use autopilot_cli::classifier::TextClassifier;
use autopilot_cli::cli::{Cli, Command};
use autopilot_cli::config::{self, ProjectConfig};
use autopilot_cli::llm::LlmClient;
use autopilot_cli::log::ActivityLog;
use autopilot_cli::pilot;
use autopilot_cli::prompt;
use autopilot_cli::window::WindowObserver;
use autopilot_cli::window::tmux::TmuxObserver;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_config_command = matches!(&cli.command, Command::Config { .. });

    let filter = match cli.verbose {
        0 if is_config_command => "autopilot_cli=warn",
        0 => "autopilot_cli=info",
        1 => "autopilot_cli=debug",
        _ => "autopilot_cli=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("failed to get current directory (was it deleted?)")?;
    let (mut config, config_path) = ProjectConfig::load(&cwd)?;
    config.apply_env(|key| std::env::var(key).ok())?;

    if !is_config_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .autopilot/config.toml found, using defaults"),
        }
    }

    match cli.command {
        Command::Run {
            title,
            model,
            interval,
            document,
            no_activity_log,
        } => {
            if let Some(title) = title {
                config.window.title_pattern = title;
            }
            if let Some(model) = model {
                config.llm.model = model;
            }
            if let Some(interval) = interval {
                config.pilot.interval_secs = interval;
            }
            if let Some(document) = document {
                config.prompt.document = document;
            }
            config.validate()?;

            let document = prompt::load_document(&cwd.join(&config.prompt.document))?;
            let system_prompt = prompt::system_instructions(&config.prompt.preamble, &document);
            let pilot_config = config.pilot_config(system_prompt)?;

            let version = TmuxObserver::check().context("tmux is required to observe windows")?;
            info!(tmux_version = %version, "tmux available");
            let observer = TmuxObserver::new();
            let llm = LlmClient::new(config.llm_settings());

            let activity = if no_activity_log {
                None
            } else {
                let path = cwd.join(".autopilot").join("logs").join("activity.jsonl");
                match ActivityLog::new(&path) {
                    Ok(log) => Some(log),
                    Err(e) => {
                        warn!(error = %e, "activity log disabled");
                        None
                    }
                }
            };

            let running = Arc::new(AtomicBool::new(true));
            let running_clone = running.clone();
            ctrlc::set_handler(move || {
                running_clone.store(false, Ordering::Relaxed);
            })
            .context("failed to install termination handler")?;

            println!(
                "\x1b[36m[autopilot]\x1b[0m starting (model {}, pattern /{}/)",
                config.llm.model, config.window.title_pattern
            );
            let report = pilot::run(
                &pilot_config,
                &observer,
                &llm,
                activity.as_ref(),
                &running,
            )?;

            println!(
                "\x1b[36m[autopilot]\x1b[0m {} cycles, {} answers typed, {} skipped, {} read failures, {} dispatch failures",
                report.cycles,
                report.dispatched,
                report.skipped,
                report.read_failures,
                report.dispatch_failures
            );
        }
        Command::Windows { title } => {
            let pattern = title.unwrap_or_else(|| config.window.title_pattern.clone());
            let pattern = Regex::new(&pattern)
                .with_context(|| format!("invalid title pattern: {pattern}"))?;
            let observer = TmuxObserver::new();
            let classifier = TextClassifier::new(config.window.busy_marker.as_str());

            let candidates = observer.candidates(&pattern)?;
            if candidates.is_empty() {
                println!("no windows match /{}/", pattern.as_str());
            }
            for candidate in candidates {
                let state = match observer.read_texts(&candidate.handle) {
                    Ok(texts) => classifier.classify(&texts).label().to_string(),
                    Err(e) => format!("unreadable ({e})"),
                };
                println!(
                    "  {:<6} {:<40} input={:<5} {}",
                    candidate.handle.id, candidate.handle.title, candidate.accepts_input, state
                );
            }
        }
        Command::Config { json } => {
            if json {
                println!("{}", config::render_json(&config, config_path.as_deref())?);
            } else {
                print!("{}", config::render_human(&config, config_path.as_deref()));
            }
        }
    }

    Ok(())
}
