//! `dose`: ask questions about documents in a local uploads directory.

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dose_rag::openai::{OpenAIChatModel, OpenAIConfig, OpenAIEmbeddingProvider};
use dose_rag::{
    ChainResult, ChatRequest, ChatResponse, Conversation, DocumentAssistant, DocumentLoader,
    LocalFileStore, RagConfig,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

#[derive(Parser)]
#[command(name = "dose", version, about = "Ask questions about your documents")]
struct Cli {
    /// Directory uploaded files are read from
    #[arg(long, env = "DOSE_UPLOAD_DIR", default_value = "uploads", global = true)]
    upload_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        #[command(flatten)]
        model: ModelArgs,

        /// File to answer from (repeatable)
        #[arg(short = 'f', long = "file")]
        files: Vec<String>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,

        question: String,
    },
    /// Start an interactive conversation
    Chat {
        #[command(flatten)]
        model: ModelArgs,

        /// File to answer from (repeatable)
        #[arg(short = 'f', long = "file")]
        files: Vec<String>,
    },
    /// Show the segments a file is split into
    Inspect { file: String },
}

#[derive(Args)]
struct ModelArgs {
    /// Chat model used for answers and follow-up rewriting
    #[arg(long, env = "DOSE_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Embedding model used for indexing and retrieval
    #[arg(long, env = "DOSE_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Number of segments retrieved per question
    #[arg(long, env = "DOSE_TOP_K")]
    top_k: Option<usize>,

    /// Reuse indexes across questions for up to this many file sets
    #[arg(long, default_value_t = 0)]
    cache: usize,
}

impl ModelArgs {
    fn assistant(&self, upload_dir: PathBuf) -> Result<DocumentAssistant> {
        let mut openai = OpenAIConfig::from_env()?;
        if let Some(model) = &self.chat_model {
            openai = openai.with_chat_model(model);
        }
        if let Some(model) = &self.embedding_model {
            openai = openai.with_embedding_model(model);
        }

        let mut config = RagConfig::builder().cache_capacity(self.cache);
        if let Some(k) = self.top_k {
            config = config.top_k(k);
        }

        let assistant = DocumentAssistant::builder()
            .config(config.build()?)
            .embedding_provider(Arc::new(OpenAIEmbeddingProvider::new(openai.clone())?))
            .generation_provider(Arc::new(OpenAIChatModel::new(openai)?))
            .file_store(Arc::new(LocalFileStore::new(upload_dir)))
            .build()?;
        Ok(assistant)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Ask { model, files, json, question } => {
            let assistant = model.assistant(cli.upload_dir)?;
            ask(&assistant, question, files, json).await
        }
        Commands::Chat { model, files } => {
            let assistant = model.assistant(cli.upload_dir)?;
            chat(&assistant, &files).await
        }
        Commands::Inspect { file } => inspect(cli.upload_dir, &file).await,
    }
}

async fn ask(
    assistant: &DocumentAssistant,
    question: String,
    files: Vec<String>,
    json: bool,
) -> Result<()> {
    let request = ChatRequest { question, file_identifiers: files, history: Vec::new() };
    let response = assistant.handle(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

async fn chat(assistant: &DocumentAssistant, files: &[String]) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut conversation = Conversation::new();
    if files.is_empty() {
        println!("No files given; answers will not be grounded in documents.");
    } else {
        println!("Answering from: {}", files.join(", "));
    }
    println!("Type your question, or Ctrl-D to quit.");

    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        editor.add_history_entry(question)?;

        match assistant.answer(question, files, conversation.turns()).await {
            Ok(result) => {
                print_result(&result);
                conversation.record_exchange(question, result.answer);
                debug!(turns = conversation.len(), "conversation updated");
            }
            // The turn is not recorded, so the next question sees the same history.
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

async fn inspect(upload_dir: PathBuf, file: &str) -> Result<()> {
    let store = Arc::new(LocalFileStore::new(upload_dir));
    let loader = DocumentLoader::from_config(store, &RagConfig::default());
    let segments = loader.load(file).await.with_context(|| format!("failed to load {file}"))?;

    println!("{file}: {} segment(s)", segments.len());
    for segment in &segments {
        let extra = segment
            .metadata
            .extra
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("[{}] {extra}", segment.position());
        println!("    {}", preview(&segment.text, 120));
    }
    Ok(())
}

fn print_result(result: &ChainResult) {
    println!("{}", result.answer);
    if !result.source_segments.is_empty() {
        let sources: Vec<String> = result
            .source_segments
            .iter()
            .map(|s| format!("{}#{}", s.source_id(), s.position()))
            .collect();
        println!("Sources: {}", sources.join(", "));
    }
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.response);
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            match source.extra.get("page") {
                Some(page) => println!("  - {} (page {page})", source.source_id),
                None => println!("  - {} (segment {})", source.source_id, source.position),
            }
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
