//! SYNCWELL probe: loads one ticket page and one database tree and prints them.

use color_eyre::eyre::{eyre, WrapErr};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use syncwell_client::config::ClientConfig;
use syncwell_client::notifications::Notification;
use syncwell_client::search::SearchFilters;
use syncwell_client::telemetry::init_tracing;
use syncwell_client::{DatabaseTreeSource, RestClient, TicketBoard};
use syncwell_tree::LazyTreeLoader;
use tracing::{info, warn};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let json = std::env::args().any(|a| a == "--json-logs");
    if let Err(err) = init_tracing(json) {
        eprintln!("tracing disabled: {}", err);
    }

    let config = ClientConfig::load().wrap_err("loading client config")?;
    let client = Arc::new(RestClient::new(&config)?);
    info!(base_url = client.base_url(), "Client ready");

    let board = TicketBoard::with_settings(client.clone(), client.clone(), config.cache_settings());
    let filters = SearchFilters::new();
    let mut page = board.watch(filters.params());

    let snapshot = tokio::time::timeout(SETTLE_TIMEOUT, page.settled())
        .await
        .wrap_err("tickets did not load in time")?
        .ok_or_else(|| eyre!("ticket query was dropped"))?;

    match (&snapshot.data, &snapshot.error) {
        (Some(tickets), _) => {
            println!("tickets: {} of {}", tickets.items.len(), tickets.total);
            for ticket in &tickets.items {
                println!("  [{}] {}", ticket.status.as_str(), ticket.title);
            }
        }
        (None, Some(err)) => {
            let notification = Notification::from_remote("load tickets", err);
            println!("{}: {}", notification.title, notification.message);
        }
        (None, None) => println!("tickets: no data"),
    }
    board.tickets().unsubscribe(page);

    let tree = LazyTreeLoader::new(
        config.tree.database.clone(),
        Arc::new(DatabaseTreeSource::new(client)),
    );
    let root = tree.root_path();
    if let Err(err) = tree.expand(&root).await {
        warn!(database = %root, error = %err, "Failed to expand database");
    }

    let schemas: Vec<_> = tree
        .children(&root)
        .unwrap_or_default()
        .into_iter()
        .map(|schema| schema.path)
        .collect();
    for (path, result) in schemas
        .iter()
        .zip(join_all(schemas.iter().map(|p| tree.expand(p))).await)
    {
        if let Err(err) = result {
            warn!(schema = %path, error = %err, "Failed to expand schema");
        }
    }

    println!("database {}:", root);
    for row in tree.visible_rows() {
        let marker = match row.error {
            Some(_) => "!",
            None if row.expanded => "-",
            None if row.kind.is_terminal() => " ",
            None => "+",
        };
        println!("{}{} {}", "  ".repeat(row.depth()), marker, row.label());
    }
    Ok(())
}
