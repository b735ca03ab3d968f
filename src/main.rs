use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use smsearch::config::{self, State};
use smsearch::dataset;
use smsearch::embedder::{Embedder, FastEmbedder};
use smsearch::export;
use smsearch::ranker::{rank, rank_multi_class, CorpusSet, RankResult};
use smsearch::store::{dataset_digest, CorpusStore};

const EMBED_BATCH_SIZE: usize = 100;

#[derive(Parser)]
#[command(name = "smsearch")]
#[command(version = "0.1")]
#[command(about = "Semantic search over labeled SMS collections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed the dataset and write one corpus file per class
    Generate {
        /// Re-embed even when the stored corpus is up to date
        #[arg(long)]
        force: bool,
    },
    /// Rank stored messages against a query and print JSON to stdout
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        floor: Option<f64>,
        /// Restrict the search to one class
        #[arg(long)]
        class: Option<String>,
    },
    /// Interactive query loop
    Repl,
    /// Search and write the results to a JSON or CSV file
    Export {
        query: String,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        floor: Option<f64>,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

/// Everything a query needs, loaded once and shared by every search in the
/// process: the per-class corpora and the embedding model.
struct SearchContext {
    set: CorpusSet,
    embedder: FastEmbedder,
    top_k: usize,
    floor: f64,
}

impl SearchContext {
    fn open(state: &State, top_k: usize, floor: f64) -> Result<Self> {
        let store = CorpusStore::new(state);
        let set = store.load_all(&state.classes)?;
        let embedder = FastEmbedder::load(state)?;
        Ok(Self {
            set,
            embedder,
            top_k,
            floor,
        })
    }

    fn search(
        &self,
        query: &str,
        class_filter: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<RankResult>>> {
        let query_vector = self.embedder.encode(query)?;
        match class_filter {
            None => Ok(rank_multi_class(
                &query_vector,
                &self.set,
                self.top_k,
                self.floor,
            )?),
            Some(filter) => {
                let mut by_class = BTreeMap::new();
                for (label, corpus) in self.set.classes() {
                    if label != filter {
                        continue;
                    }
                    let results = match corpus {
                        Some(corpus) => rank(&query_vector, corpus, self.top_k, self.floor)?,
                        None => Vec::new(),
                    };
                    by_class.insert(label.to_string(), results);
                }
                Ok(by_class)
            }
        }
    }
}

fn check_class(state: &State, class: &str) -> Result<()> {
    if !state.classes.iter().any(|label| label == class) {
        anyhow::bail!(
            "unknown class '{}'; available classes: {}",
            class,
            state.classes.join(", ")
        );
    }
    Ok(())
}

fn generate_command(state: &State, force: bool) -> Result<()> {
    let dataset_path = Path::new(&state.dataset_path);
    let digest = dataset_digest(dataset_path)?;
    let store = CorpusStore::new(state);

    let mut pending = Vec::new();
    for label in &state.classes {
        if !force {
            if let Some(fingerprint) = store.stored_fingerprint(label)? {
                if fingerprint.model == state.model_name && fingerprint.dataset_digest == digest {
                    println!("{}: embeddings up to date, skipping", label);
                    continue;
                }
            }
        }
        pending.push(label.clone());
    }
    if pending.is_empty() {
        println!("All class embeddings are up to date.");
        return Ok(());
    }

    let by_class = dataset::load_dataset(dataset_path, &state.classes)?;
    let embedder = FastEmbedder::load(state)?;

    for label in &pending {
        let records = &by_class[label];
        if records.is_empty() {
            println!("No {} SMS found. Skipping.", label);
            continue;
        }

        println!("Generating embeddings for {} {} SMS...", records.len(), label);
        let mut vectors = Vec::with_capacity(records.len());
        for (i, batch) in records.texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            vectors.extend(embedder.encode_batch(batch)?);
            config::verbose_print(&format!(
                "Processed {}/{} {} SMS",
                i * EMBED_BATCH_SIZE + batch.len(),
                records.len(),
                label
            ));
        }

        store.save_class(
            label,
            records.ids.clone(),
            records.texts.clone(),
            &vectors,
            embedder.dimension(),
            &digest,
        )?;
        println!("{}: stored {} embeddings", label, vectors.len());
    }

    Ok(())
}

fn search_command(
    state: &State,
    query: &str,
    top_k: usize,
    floor: f64,
    class: Option<&str>,
) -> Result<()> {
    if let Some(class) = class {
        check_class(state, class)?;
    }
    let context = SearchContext::open(state, top_k, floor)?;
    let by_class = context.search(query, class)?;

    let counts: BTreeMap<&String, usize> = by_class.iter().map(|(l, r)| (l, r.len())).collect();
    let output = serde_json::json!({
        "query": query,
        "model": context.embedder.model_name(),
        "results": by_class,
        "result_counts": counts,
        "requested_results_count": top_k,
        "similarity_floor": floor,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn export_command(
    state: &State,
    query: &str,
    format: ExportFormat,
    output: Option<PathBuf>,
    top_k: usize,
    floor: f64,
) -> Result<()> {
    let context = SearchContext::open(state, top_k, floor)?;
    let by_class = context.search(query, None)?;

    let path = match (output, format) {
        (Some(path), _) => path,
        (None, ExportFormat::Json) => export::default_export_path("json"),
        (None, ExportFormat::Csv) => export::default_export_path("csv"),
    };
    match format {
        ExportFormat::Json => export::export_json(&path, query, &by_class)?,
        ExportFormat::Csv => export::export_csv(&path, query, &by_class)?,
    }
    println!("Results written to {}", path.display());
    Ok(())
}

fn show_results(results: &[RankResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("\n{}. SMS (similarity: {:.3})", i + 1, result.similarity);
        println!("   id: {}", result.sms_id);
        println!("   text: {}", result.text);
        println!("{}", "-".repeat(40));
    }
}

fn prompt(message: &str) -> Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_repl_help(state: &State) {
    println!("\nAvailable commands:");
    println!("- 'exit' or 'q': quit the program");
    println!("- 'help': show this help");
    for label in &state.classes {
        println!("- 'class {}': search only in {} SMS", label, label);
    }
    println!("- any other text: search across all classes");
}

fn repl_command(state: &State) -> Result<()> {
    println!("Loading embedding model...");
    let context = SearchContext::open(state, state.top_k, state.similarity_floor)?;
    println!("Model loaded.");

    if context.set.loaded_count() == 0 {
        anyhow::bail!("no embeddings found for any class; run 'smsearch generate' first");
    }

    println!("\n{}", "=".repeat(60));
    println!("SMS SEMANTIC SEARCH");
    println!("{}", "=".repeat(60));
    println!("Type 'exit' or 'q' to quit.");
    println!("Type 'help' to see available commands.");
    println!("Type 'class <class_name>' to search within a specific class.");
    println!("Available classes: {}", state.classes.join(", "));

    loop {
        println!("\n{}", "-".repeat(40));
        let query = match prompt("Enter your SMS query: ")? {
            Some(query) => query,
            None => break,
        };

        let lowered = query.to_lowercase();
        if lowered == "exit" || lowered == "q" {
            println!("Goodbye!");
            break;
        }
        if lowered == "help" {
            print_repl_help(state);
            continue;
        }
        if query.is_empty() {
            println!("Please enter a valid query.");
            continue;
        }

        if let Some(class_name) = lowered.strip_prefix("class ") {
            let class_name = class_name.trim();
            if check_class(state, class_name).is_err() {
                println!(
                    "Unknown class '{}'. Available classes: {}",
                    class_name,
                    state.classes.join(", ")
                );
                continue;
            }
            let class_query = match prompt(&format!("Enter your query for {} SMS: ", class_name))? {
                Some(query) if !query.is_empty() => query,
                _ => continue,
            };
            println!(
                "\nSearching for {} SMS similar to: '{}'",
                class_name, class_query
            );
            let by_class = context.search(&class_query, Some(class_name))?;
            if let Some(results) = by_class.get(class_name) {
                show_results(results);
            }
            continue;
        }

        println!("\nSearching for SMS similar to: '{}'", query);
        let by_class = context.search(&query, None)?;
        for (label, results) in &by_class {
            println!("\n--- {} RESULTS ---", label.to_uppercase());
            show_results(results);
        }
    }

    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let state = State::new()?;

    match args.command {
        Commands::Generate { force } => generate_command(&state, force)?,
        Commands::Search {
            query,
            top_k,
            floor,
            class,
        } => search_command(
            &state,
            &query,
            top_k.unwrap_or(state.top_k),
            floor.unwrap_or(state.similarity_floor),
            class.as_deref(),
        )?,
        Commands::Repl => repl_command(&state)?,
        Commands::Export {
            query,
            format,
            output,
            top_k,
            floor,
        } => export_command(
            &state,
            &query,
            format,
            output,
            top_k.unwrap_or(state.top_k),
            floor.unwrap_or(state.similarity_floor),
        )?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
