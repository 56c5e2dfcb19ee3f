//! staged-rag binary
//!
//! Run the server with: cargo run -p staged-rag -- serve
//! Query it with:       cargo run -p staged-rag -- query recipes "suggest a sandwich"

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use staged_rag::{
    config::RagConfig, server::RagServer, Outcome, QueryClient, QueryRequest, RewriteRequest,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "staged-rag", version, about = "Knowledge-base Q&A with a staged, streamed pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "STAGED_RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Send a query to a running server and print its progress
    Query {
        /// Knowledge base name
        kb: String,
        /// Natural-language prompt
        prompt: String,
        /// Restrict retrieval to one document
        #[arg(long)]
        doc_id: Option<String>,
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
    /// Rewrite a supplement product description in a tone
    Rewrite {
        /// Product document ID
        doc_id: String,
        #[arg(long, default_value = "balanced")]
        tone: String,
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staged_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Query {
            kb,
            prompt,
            doc_id,
            url,
        } => {
            let mut request = QueryRequest::new(kb, prompt);
            request.doc_id = doc_id;
            let client = QueryClient::new(url)?;
            let outcome = client.query(&request, print_progress).await?;
            print_outcome(outcome)
        }
        Command::Rewrite { doc_id, tone, url } => {
            let client = QueryClient::new(url)?;
            let outcome = client
                .rewrite(&RewriteRequest { doc_id, tone }, print_progress)
                .await?;
            print_outcome(outcome)
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = RagConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM: {:?} / {}", config.llm.backend, config.llm.model());
    tracing::info!(
        "  - Embeddings: {:?} / {} ({} dims)",
        config.embeddings.backend,
        config.embeddings.model(),
        config.embeddings.dimensions
    );
    tracing::info!("  - Knowledge bases: {}", config.storage.knowledge_bases.join(", "));
    tracing::info!("  - Max refine rounds: {}", config.pipeline.max_refine_rounds);

    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /query                     - Streamed query");
    println!("  POST /query/supplement/rewrite  - Streamed product rewrite");
    println!("  POST /ingest/:kb                - Add a text document");
    println!("  POST /ingest/:kb/file           - Upload a PDF, HTML, or text file");
    println!("  POST /ingest/:kb/url            - Fetch and add a web page");
    println!("  GET  /doc/:kb                   - List documents");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;
    Ok(())
}

fn print_progress(label: &str) {
    eprintln!("… {}", label);
}

fn print_outcome(outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::Complete { answer, sources } => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", answer)?;
            if !sources.is_empty() {
                writeln!(stdout, "\nSources:")?;
                for (i, source) in sources.iter().enumerate() {
                    writeln!(
                        stdout,
                        "  [{}] {} (chunk {})",
                        i + 1,
                        source.title,
                        source.chunk_index
                    )?;
                }
            }
            Ok(())
        }
        Outcome::Error { message } => anyhow::bail!(message),
    }
}
