use std::time::Duration;

use bgg_http::{BggClient, BggError, FetchOptions};

fn live_username() -> Option<String> {
    std::env::var("BGG_LIVE_USERNAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[tokio::test]
async fn live_collection_roundtrip() {
    let Some(username) = live_username() else {
        eprintln!("skipping live test: BGG_LIVE_USERNAME is not set");
        return;
    };

    let client = BggClient::with_cache_uri("memory:///?ttl=300")
        .expect("memory cache must build")
        .with_options(
            FetchOptions::default()
                .with_timeout(Duration::from_secs(20))
                .with_retries(5),
        );

    let collection = match client.collection(&username).await {
        Ok(collection) => collection,
        Err(BggError::RetryableRequest { .. }) => {
            eprintln!("skipping live test: collection is still being prepared");
            return;
        }
        Err(err) => panic!("live collection fetch failed: {err}"),
    };

    assert_eq!(collection.owner(), Some(username.as_str()));
    assert_eq!(collection.iter().count(), collection.len());
    for game in &collection {
        assert!(game.get_i64("id").is_some());
    }
}
