use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use shelfscan::{
    BookPipeline, BrowserConfig, ExtractionConfig, HttpBrowser, OutputConfig, PipelineConfig,
    SearchClient, SearchConfig, SegmentationConfig, SegmentationService, TitleExtractionService,
};

#[derive(Parser)]
#[command(name = "shelfscan")]
#[command(about = "Identify the books on a shelf photo and fetch their catalog details")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, env = "SEGMENTATION_API_KEY", hide_env_values = true)]
    segmentation_api_key: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Detection model identifier
    #[arg(long, default_value = shelfscan::config::DEFAULT_MODEL_ID)]
    model_id: String,

    /// Drop detections below this confidence (keeps all by default)
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Directory for crops and the extraction checkpoint
    #[arg(long, value_name = "DIR", default_value = "temp")]
    scratch_dir: PathBuf,

    /// Where to write the final catalog JSON
    #[arg(short, long, value_name = "FILE", default_value = "book_details.json")]
    output: PathBuf,

    /// Seconds to pause between candidates
    #[arg(long, default_value_t = 5)]
    candidate_delay: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "shelfscan=debug" } else { "shelfscan=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let segmentation = SegmentationService::from_config(
        &SegmentationConfig::new(args.segmentation_api_key)
            .with_model_id(args.model_id)
            .with_min_confidence(args.min_confidence),
    )?;
    let extraction =
        TitleExtractionService::from_config(&ExtractionConfig::new(args.openai_api_key))?;

    let browser = HttpBrowser::new(&BrowserConfig::default())?;
    let search = SearchClient::new(Box::new(browser.clone()), SearchConfig::default());

    let output = OutputConfig {
        checkpoint_path: args.scratch_dir.join("all_details.json"),
        scratch_dir: args.scratch_dir,
        catalog_path: args.output,
    };
    let config = PipelineConfig::default()
        .with_output(output)
        .with_candidate_delay(Duration::from_secs(args.candidate_delay));

    let pipeline = BookPipeline::new(segmentation, extraction, search, Box::new(browser))
        .with_config(config);
    let run = pipeline.run(&args.image_path)?;

    println!("\n=== Shelf Catalog ===");
    println!(
        "Detections: {}, candidates: {}, books found: {}",
        run.detections,
        run.candidates.len(),
        run.catalog.len()
    );

    for (name, record) in run.catalog.iter() {
        println!("\n{name}");
        println!("  Title:   {}", record.title);
        if !record.authors.is_empty() {
            println!("  Authors: {}", record.authors);
        }
        println!("  Genres:  {}", record.genres.join(", "));
        println!("  Reviews: {}", record.reviews.len());
        println!("  Link:    {}", record.source_link);
    }

    let unresolved: Vec<_> = run
        .outcomes
        .iter()
        .filter(|outcome| outcome.status.label() != "found")
        .collect();
    if !unresolved.is_empty() {
        println!("\nNot cataloged:");
        for outcome in unresolved {
            println!("  {} - {}", outcome.key, outcome.status);
        }
    }

    println!(
        "\nCatalog written to {}",
        pipeline.config().output.catalog_path.display()
    );

    Ok(())
}
