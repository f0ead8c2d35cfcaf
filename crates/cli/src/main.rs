//! CLI for Lookout access checks.
//!
//! `check` runs one query to settlement; `watch` follows entity ids read
//! from stdin and prints the latest view whenever it changes. Quick
//! transitions are coalesced by the watch channel.

use clap::{Args, Parser, Subcommand};
use lookout_provider::{HttpAccessSource, HttpSourceConfig};
use lookout_query::{AccessQuery, AccessView, QueryClient, QueryConfig, ViewReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "lookout", version, about = "Entity access checks against a remote endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct EndpointArgs {
    #[arg(short, long, env = "LOOKOUT_BASE_URL")]
    base_url: String,

    /// Endpoint path; `{entity_id}` is replaced by the encoded id.
    #[arg(long, env = "LOOKOUT_PATH_TEMPLATE", default_value = HttpSourceConfig::DEFAULT_PATH_TEMPLATE)]
    path_template: String,

    /// Bearer token sent with every request.
    #[arg(long, env = "LOOKOUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds a successful answer is reused.
    #[arg(long, env = "LOOKOUT_STALE_SECS", default_value_t = 30)]
    stale_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check access to a single entity.
    Check {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[arg(short, long)]
        entity: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Read entity ids from stdin, one per line, and follow the query.
    /// Lines are trimmed; a blank line disables it.
    Watch {
        #[command(flatten)]
        endpoint: EndpointArgs,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            endpoint,
            entity,
            json,
        } => {
            let t0 = Instant::now();
            let client = build_client(&endpoint)?;

            tracing::info!(entity = %entity, "checking access");

            let query = AccessQuery::new(client, Some(entity.as_str()));
            let view = query.settled().await;

            tracing::info!(
                entity = %entity,
                has_access = view.has_access(),
                elapsed_ms = t0.elapsed().as_millis(),
                "check complete"
            );
            emit(&view, json)?;
        }
        Commands::Watch { endpoint, json } => {
            let client = build_client(&endpoint)?;
            watch(client, json).await?;
        }
    }

    Ok(())
}

fn build_client(args: &EndpointArgs) -> Result<Arc<QueryClient>, Box<dyn std::error::Error>> {
    let mut config =
        HttpSourceConfig::new(&args.base_url)?.with_path_template(args.path_template.as_str())?;
    if let Some(token) = &args.token {
        config = config.with_bearer_token(token.as_str());
    }

    let source = HttpAccessSource::new(config)?;
    let query_config = QueryConfig::default().with_stale_time(Duration::from_secs(args.stale_secs));

    Ok(Arc::new(QueryClient::new(Arc::new(source), query_config)))
}

async fn watch(client: Arc<QueryClient>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut query = AccessQuery::new(client, None);
    let mut views = query.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    emit(&query.view(), json)?;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => query.set_entity_id(Some(line.trim())),
                None => {
                    stdin_open = false;
                    tracing::debug!("stdin closed, waiting for the last query to settle");
                    if !views.has_changed()? && !query.view().is_loading() {
                        break;
                    }
                }
            },
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                emit(&view, json)?;
                if !stdin_open && !view.is_loading() {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn emit(view: &AccessView, json: bool) -> Result<(), serde_json::Error> {
    let report = ViewReport::build(view);
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(())
}
