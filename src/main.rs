use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::time::Instant;

mod cli;
mod pipeline;
mod utils;

use cli::Args;
use pipeline::oracle::CliOracle;
use pipeline::store::ResultStore;
use pipeline::{ImageOutcome, ImageReport, PipelineConfig, PipelineEngine};
use utils::{create_progress_bar, format_duration, image_display_name, validate_inputs, verbose_println};

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();

    // Print banner
    println!("{}", style("Anomaly Annotator").bold().blue());
    println!(
        "{}",
        style("Resumable batch detection and overlay rendering").dim()
    );
    println!();

    // Setup validation is batch-fatal; nothing per-image has happened yet
    validate_inputs(&args)?;

    std::fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;
    println!(
        "Output will be saved to: {}",
        style(args.output_dir.display()).bold()
    );

    // Load the prompt once; it is reused verbatim for every image
    let instruction = std::fs::read_to_string(&args.prompt_file)
        .with_context(|| format!("Failed to read prompt file: {}", args.prompt_file.display()))?;

    let config = PipelineConfig {
        extensions: args.parse_extensions(),
        pace_interval: args.pace_interval(),
        verbose: args.verbose,
    };

    if config.verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Input directory: {}", args.input_dir.display());
        println!("  Output directory: {}", args.output_dir.display());
        println!("  Detector: {} (model {})", args.oracle_cmd, args.model);
        println!("  Extensions: {:?}", config.extensions);
        println!("  Pacing: {:?}", config.pace_interval);
        println!();
    }

    let oracle = CliOracle::new(args.oracle_cmd.clone(), args.model.clone());
    let store = ResultStore::new(&args.output_dir);
    let mut engine = PipelineEngine::new(config, store, oracle);

    let image_files = engine.discover_images(&args.input_dir)?;
    if image_files.is_empty() {
        println!(
            "{}",
            style("No images found with specified extensions").red()
        );
        return Ok(());
    }
    println!("Found {} images to process.", style(image_files.len()).bold());
    println!();

    // Sequential processing loop: each image fully finishes before the next
    let progress = create_progress_bar(image_files.len() as u64);
    progress.set_message("Processing images");

    let mut reports: Vec<ImageReport> = Vec::with_capacity(image_files.len());
    for image_path in &image_files {
        progress.set_message(image_display_name(image_path).to_string());
        let report = engine.process_image(image_path, &instruction);
        progress.inc(1);
        reports.push(report);
    }
    progress.finish_with_message("✓ Processing complete");
    println!();

    print_summary(&reports, start_time.elapsed(), args.verbose);

    Ok(())
}

fn print_summary(reports: &[ImageReport], total_time: std::time::Duration, verbose: bool) {
    let count = |outcome: ImageOutcome| reports.iter().filter(|r| r.outcome == outcome).count();

    let rendered = count(ImageOutcome::Rendered);
    let up_to_date = count(ImageOutcome::UpToDate);
    let no_detections = count(ImageOutcome::NoDetections);
    let not_json = count(ImageOutcome::NotJson);
    let analysis_failed = count(ImageOutcome::AnalysisFailed);
    let render_failed = count(ImageOutcome::RenderFailed);
    let oracle_calls = reports.iter().filter(|r| r.oracle_invoked).count();

    println!("{}", style("Results Summary:").bold().green());
    println!("  Annotated: {}", style(rendered).bold().green());
    if no_detections > 0 {
        println!(
            "  No detections (record only): {}",
            style(no_detections).bold().cyan()
        );
    }
    if up_to_date > 0 {
        println!(
            "  Skipped (already complete): {}",
            style(up_to_date).bold().yellow()
        );
    }
    if not_json > 0 {
        println!(
            "  Non-JSON detector output: {}",
            style(not_json).bold().yellow()
        );
    }
    if analysis_failed > 0 {
        println!("  Analysis failures: {}", style(analysis_failed).bold().red());
    }
    if render_failed > 0 {
        println!(
            "  Visualization failures: {}",
            style(render_failed).bold().red()
        );
    }
    println!("  Detector calls this run: {}", style(oracle_calls).bold());

    let failures: Vec<&ImageReport> = reports
        .iter()
        .filter(|r| {
            matches!(
                r.outcome,
                ImageOutcome::AnalysisFailed | ImageOutcome::RenderFailed
            )
        })
        .collect();

    if !failures.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").bold().red());
        for (i, report) in failures.iter().enumerate() {
            println!(
                "  {}: {} - {}",
                style(format!("#{}", i + 1)).dim(),
                style(image_display_name(&report.image)).bold().red(),
                report.detail.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
        println!(
            "{}",
            style("These images keep their retry eligibility on the next run").yellow()
        );
    }

    println!();
    println!("{}", style("Performance:").bold().blue());
    println!(
        "  Total processing time: {}",
        style(format_duration(total_time)).bold()
    );
    if !reports.is_empty() {
        println!(
            "  Average time per image: {}",
            style(format_duration(total_time / reports.len() as u32)).dim()
        );
    }

    verbose_println(
        verbose,
        &format!("Processed {} images in total", reports.len()),
    );
}
