mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;

use cli::{Cli, Commands};
use course_stats::prelude::*;
use course_stats::extract::decode_sections;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `run` output stays plain JSON on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = StatsConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { pretty } => {
            let aggregator = Aggregator::from_config(&cfg)?;
            let result = aggregator.run().await;
            let out = if pretty { serde_json::to_string_pretty(&result)? } else { serde_json::to_string(&result)? };
            println!("{out}");
        }
        Commands::Sources => {
            for s in &cfg.sources {
                println!("{:<12} {:<9} {}", s.id, s.metric, s.url);
            }
        }
        Commands::Classify { file } => classify_file(&cfg, &file)?,
    }
    Ok(())
}

fn classify_file(cfg: &StatsConfig, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    let sections = decode_sections(&payload).unwrap_or_else(|| {
        tracing::warn!(path = %path.display(), "no data.course.lecture_sections in payload");
        Vec::new()
    });

    let classifier = WebinarClassifier::new(&cfg.exclusion_keywords);
    let verdicts = classifier.explain(&sections);
    for (i, v) in verdicts.iter().enumerate() {
        let excluded = v.matched_keyword.as_deref().map(|k| format!(" (matched \"{k}\")")).unwrap_or_default();
        println!(
            "{:>3}. id={} name=\"{}\" lectures={} included={}{}",
            i + 1,
            v.section.id.as_deref().unwrap_or("-"),
            v.section.name.as_deref().unwrap_or(""),
            v.section.lectures,
            v.included,
            excluded
        );
    }
    let included = verdicts.iter().filter(|v| v.included).count();
    println!(
        "webinars: {} ({} of {} sections included)",
        classifier.classify(&sections),
        included,
        verdicts.len()
    );
    Ok(())
}
