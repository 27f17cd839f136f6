use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;

use weft_client::session::{HttpSession, SessionConfig};
use weft_client::transport::SseTransport;
use weft_core::ids::IriId;
use weft_core::session::SearchKind;
use weft_store::{EntityStore, StoreConfig};

#[derive(Parser)]
#[command(name = "weft", version, about = "Read and watch objects in a federated social graph")]
struct Cli {
    /// Bearer token for authenticated reads; falls back to WEFT_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Render context applied after the ActivityStreams vocabulary.
    #[arg(long, global = true)]
    render_context: Option<String>,

    /// Server search endpoint, required by `search`.
    #[arg(long, global = true)]
    search_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one object and print its compacted form.
    Get {
        /// Object identifier.
        iri: String,
        /// Refetch even when the object is already cached.
        #[arg(long)]
        refresh: bool,
    },
    /// Follow a collection's push channel and print arriving identifiers.
    Watch {
        /// Collection identifier.
        collection: String,
    },
    /// Query the server-side search endpoint.
    Search {
        /// What the query matches against.
        #[arg(value_enum)]
        kind: Kind,
        /// Query text.
        query: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Actor,
    Emoji,
}

impl From<Kind> for SearchKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Actor => SearchKind::Actor,
            Kind::Emoji => SearchKind::Emoji,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        tracing::error!(error = %error, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var("WEFT_TOKEN").ok());

    let session = Arc::new(HttpSession::new(SessionConfig {
        token: token.map(SecretString::from),
        search_url: cli.search_endpoint.clone().unwrap_or_default(),
        ..SessionConfig::default()
    }));
    let transport = Arc::new(SseTransport::default());
    let store = EntityStore::new(
        session,
        transport,
        StoreConfig {
            render_context: cli.render_context.clone(),
            preload: HashMap::new(),
        },
    );

    match cli.command {
        Command::Get { iri, refresh } => {
            let node = store.get(&IriId::new(iri), !refresh).await?;
            println!("{}", serde_json::to_string_pretty(&node.to_json())?);
        }
        Command::Watch { collection } => {
            let watch = store.listen(
                &IriId::new(collection),
                Arc::new(|id: &IriId| {
                    println!("{id}");
                }),
            );
            tracing::info!(collection = %watch.collection(), "watching; ctrl+c to stop");
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
            store.unlisten(watch);
        }
        Command::Search { kind, query } => {
            if cli.search_endpoint.is_none() {
                anyhow::bail!("search needs --search-endpoint");
            }
            let results = store.search(kind.into(), &query).await?;
            for node in results {
                println!("{}", serde_json::to_string_pretty(&node.to_json())?);
            }
        }
    }
    Ok(())
}
