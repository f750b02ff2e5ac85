use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relgraph::graph::chains::basename;
use relgraph::{Config, Vault};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relgraph", version)]
#[command(about = "Typed relation graph over a folder of markdown documents")]
struct Cli {
    /// Config file (default: $RELGRAPH_CONFIG, then ./relgraph.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every edge, explicit and implied
    Edges {
        /// Emit JSON instead of one edge per line
        #[arg(long)]
        json: bool,
        /// Only print implied edges
        #[arg(long)]
        implied: bool,
    },
    /// Print the ancestors of a document, nearest first
    Ancestors {
        path: String,
        /// Only follow these relation uids (repeatable)
        #[arg(short, long = "relation")]
        relations: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the children of a document in reading order
    Children {
        path: String,
        #[arg(short, long, default_value = "down")]
        relation: String,
    },
    /// Print the sequential chains among the children of a document
    Chains {
        path: String,
        #[arg(short, long, default_value = "down")]
        relation: String,
        #[arg(long)]
        json: bool,
    },
    /// Watch the vault and keep the graph current (Ctrl+C to stop)
    Watch {
        /// Debounce delay in milliseconds (default: graph.debounce_ms)
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let _ = dotenv::dotenv();
            Config::load_from(path)
        }
        None => Config::load(),
    }
}

/// Vault-relative form of a path typed on the command line.
fn document_arg(vault: &Vault, path: &str) -> Result<String> {
    let path = relgraph::ingest::normalize_path(path);
    if vault.contains(&path) {
        return Ok(path);
    }
    let with_ext = format!("{}.md", path);
    if vault.contains(&with_ext) {
        return Ok(with_ext);
    }
    Err(relgraph::RelgraphError::DocumentNotFound(path)).context("not a document in the vault")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.vault.log_level.as_str()),
    )
    .init();

    log::info!("Starting relgraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Vault root: {}", config.root().display());

    let vault = Vault::open(&config)?;

    match cli.command {
        Command::Edges { json, implied } => {
            let edges = vault.edges()?;
            let selected: Vec<_> = edges.iter().filter(|e| !implied || e.implied).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&selected)?);
            } else {
                for edge in selected {
                    let label = edge.label.as_deref().map(|l| format!(".{}", l)).unwrap_or_default();
                    let origin = edge
                        .implied_from_uid
                        .as_deref()
                        .map(|uid| format!("  (implied from {})", uid))
                        .unwrap_or_default();
                    println!(
                        "{} -[{}{}]-> {}{}",
                        edge.from_path, edge.relation_uid, label, edge.to_path, origin
                    );
                }
            }
        }
        Command::Ancestors {
            path,
            relations,
            json,
        } => {
            let path = document_arg(&vault, &path)?;
            let filter = (!relations.is_empty()).then_some(relations.as_slice());
            let ancestors = vault.ancestors(&path, filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ancestors)?);
            } else {
                for node in ancestors {
                    println!(
                        "{:>3}  {}  via {}{}",
                        node.depth,
                        node.path,
                        node.via_relation_uid,
                        if node.implied { " (implied)" } else { "" }
                    );
                }
            }
        }
        Command::Children { path, relation } => {
            let path = document_arg(&vault, &path)?;
            for child in vault.ordered_children(&path, &relation)? {
                println!("{}", child);
            }
        }
        Command::Chains {
            path,
            relation,
            json,
        } => {
            let path = document_arg(&vault, &path)?;
            let chains = vault.chains(&path, &relation)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chains)?);
            } else {
                for (head, members) in &chains.chains {
                    let names: Vec<&str> = members.iter().map(|m| basename(m)).collect();
                    println!("{}: {}", head, names.join(" -> "));
                }
                for path in &chains.disconnected {
                    println!("{}: (unchained)", path);
                }
            }
        }
        Command::Watch { debounce_ms } => {
            let debounce_ms = debounce_ms.unwrap_or(config.graph.debounce_ms);
            log::info!("Debounce: {} ms", debounce_ms);
            log::info!("Watching for changes (Ctrl+C to stop)");
            relgraph::watch::run_watcher(vault, debounce_ms).await?;
        }
    }

    Ok(())
}
