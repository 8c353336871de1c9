use clap::{Parser, Subcommand};
use cortex_retriever::config::KnowledgeConfig;
use cortex_retriever::service::{
    AnswerRequest, DEFAULT_TOP_K, IngestRequest, KnowledgeService, QueryHit, QueryRequest,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// A CLI tool to ingest documents into the knowledge store and query it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and store a document
    Ingest {
        /// Raw text to ingest
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// File to ingest (decoded as UTF-8, falling back to Latin-1)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Source name stored with every chunk
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Search the store and print the assembled prompt
    Query {
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Prompt header replacing the default instruction
        #[arg(short, long)]
        instruction: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search, build a prompt and forward it to the orchestrator if configured
    Answer {
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Model name passed to the orchestrator
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Show store statistics
    Stats,
    /// Delete every stored chunk
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_hits(hits: &[QueryHit], format: &OutputFormat) {
    println!("Found {} chunks:", hits.len());
    for hit in hits {
        match format {
            OutputFormat::Full => {
                println!("Score: {:.3}", hit.score);
                println!("Chunk ID: {}", hit.id);
                println!("Source: {}", hit.source);
                for (key, value) in &hit.metadata {
                    println!("  {key}: {value}");
                }
                println!("Content:\n{}", hit.text);
                println!("---");
            }
            _ => {
                println!(
                    "  [{:.3}] #{} {} - {}",
                    hit.score,
                    hit.id,
                    hit.source,
                    hit.text.chars().take(80).collect::<String>().replace('\n', " ")
                );
            }
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = KnowledgeConfig::load(args.config.as_deref())?;
    let service = KnowledgeService::from_config(&config).await?;

    match args.command {
        Commands::Ingest { text, file, source } => {
            let request = match (text, file) {
                (Some(text), _) => IngestRequest::text(text),
                (None, Some(path)) => {
                    let bytes = tokio::fs::read(&path).await?;
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    IngestRequest::file(filename, bytes)
                }
                (None, None) => anyhow::bail!("provide --text or --file"),
            };
            let request = match source {
                Some(source) => request.with_source(source),
                None => request,
            };

            let response = service.ingest(request).await?;
            println!(
                "Ingested '{}': {} chunks (doc_id {})",
                response.source, response.chunks, response.doc_id
            );
        }
        Commands::Query {
            query,
            top_k,
            instruction,
            format,
        } => {
            let mut request = QueryRequest::new(query).with_top_k(top_k);
            if let Some(instruction) = instruction {
                request = request.with_instruction(instruction);
            }
            let response = service.query(request).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                _ => {
                    print_hits(&response.results, &format);
                    println!("\nPrompt:\n{}", response.prompt);
                }
            }
        }
        Commands::Answer {
            query,
            top_k,
            model,
        } => {
            let request = AnswerRequest {
                query,
                top_k,
                model,
            };
            let response = service.answer(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Stats => {
            let stats = service.stats().await?;
            println!("Backend: {}", stats.backend);
            println!("Chunks: {}", stats.chunks);
            match stats.dimension {
                Some(dimension) => println!("Dimension: {dimension}"),
                None => println!("Dimension: not yet established"),
            }
        }
        Commands::Reset => {
            service.reset().await?;
            println!("Store reset");
        }
    }

    Ok(())
}
