use casetrace::cli::Args;
use casetrace::models::Severity;
use casetrace::{EvidenceStore, Orchestrator};
use clap::Parser;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet flags
    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    log::info!("casetrace starting with args: {:?}", args);

    let store = Arc::new(EvidenceStore::open(&args.db)?);

    // Sources left in Processing by an interrupted run need attention;
    // they are never resumed automatically.
    let stale = store.stale_processing_sources()?;
    for id in &stale {
        log::warn!("source {} is stuck in processing from an earlier run", id);
    }

    let name = args.name.clone().unwrap_or_else(|| {
        args.artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string())
    });
    let source = store.create_source(
        &args.case_id,
        &name,
        args.source_type,
        &args.artifact,
        &args.uploader,
    )?;

    let bar = if args.quiet {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {pos} records  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("analyzing {}", name));
        Some(bar)
    };

    let orchestrator = Orchestrator::new(Arc::clone(&store));
    let report = orchestrator.run(&source.id, bar.as_ref()).await?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let completed = store.get_source(&source.id)?;
    println!("Analysis completed");
    println!("  Source:            {} ({})", source.id, source.source_type);
    println!("  Artifact sha256:   {}", source.sha256);
    println!("  Items extracted:   {}", completed.items_extracted);
    println!("  Records skipped:   {}", completed.records_skipped);
    println!(
        "  Network:           {} participants, {} edges",
        report.network.nodes.len(),
        report.network.edges.len()
    );
    let high = report
        .findings
        .iter()
        .filter(|f| f.severity == Severity::High)
        .count();
    println!(
        "  Findings:          {} total, {} high severity",
        report.findings.len(),
        high
    );
    for finding in report.findings.iter().take(5) {
        println!("    [{}] {}", finding.severity, finding.title);
    }

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("  Report written to: {}", path.display());
    }

    Ok(())
}
