use analysis_core::{AnalysisMode, AnalysisRequest};
use analysis_pipeline::AnalysisPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mode = match args.iter().position(|a| a == "--deep") {
        Some(pos) => {
            args.remove(pos);
            Some(AnalysisMode::Deep)
        }
        None => None,
    };

    if args.is_empty() {
        eprintln!("usage: analysis-pipeline [--deep] <question...>");
        std::process::exit(2);
    }

    let pipeline = AnalysisPipeline::from_env().await?;

    let mut request = AnalysisRequest::new(args.join(" "), "cli");
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }

    let response = pipeline.analyze(&request).await?;

    println!("{}", serde_json::to_string_pretty(&response.result)?);
    tracing::info!(
        "score {:.1}, confidence {:.2}, fixed: {}, cached: {}, provider: {}",
        response.quality.score,
        response.quality.confidence,
        response.was_fixed,
        response.from_cache,
        response.provider.as_deref().unwrap_or("-")
    );
    for issue in &response.quality.issues {
        tracing::warn!("quality issue: {}", issue);
    }

    Ok(())
}
