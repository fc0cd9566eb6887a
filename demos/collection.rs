use bgg_http::{BggClient, BggError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let username = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: collection <username>"))?;
    let client = BggClient::from_env()?;

    // The API may keep answering 202 beyond the retry budget for large
    // collections; asking again later with a fresh budget is the way out.
    let collection = loop {
        match client.collection(&username).await {
            Err(err @ BggError::RetryableRequest { .. }) => {
                eprintln!("{err}, asking again");
            }
            other => break other?,
        }
    };

    println!("{collection}");
    for game in &collection {
        println!(
            "{:>8}  {}  ({})",
            game.get_i64("id").unwrap_or_default(),
            game.get_str("name").unwrap_or("?"),
            game.get_i64("yearpublished")
                .map_or_else(|| "n/a".to_owned(), |year| year.to_string()),
        );
    }

    Ok(())
}
