// src/fetch/links.rs
use anyhow::{Context, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, error, info};
use url::Url;

/// Collect absolute URLs of every `<a href>` in `html` whose path ends with `extension`.
/// Relative hrefs are resolved against `base`; duplicates keep their first position.
pub fn extract_links(html: &str, base: &Url, extension: &str) -> Vec<Url> {
    let selector = Selector::parse("a[href]").expect("anchor selector should parse");
    let extension = extension.to_lowercase();
    let mut links: Vec<Url> = Vec::new();

    for href in Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
    {
        let Ok(url) = base.join(href.trim()) else {
            debug!(href, "skipping unresolvable href");
            continue;
        };
        if !url.path().to_lowercase().ends_with(&extension) {
            continue;
        }
        if !links.contains(&url) {
            links.push(url);
        }
    }

    links
}

async fn fetch_listing(client: &Client, listing: &Url) -> Result<String> {
    client
        .get(listing.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", listing))?
        .error_for_status()
        .with_context(|| format!("non-success status from {}", listing))?
        .text()
        .await
        .with_context(|| format!("reading body from {}", listing))
}

/// Fetch the listing page and return its `extension` links.
/// A failed fetch is logged and yields an empty list.
#[tracing::instrument(level = "info", skip(client, listing), fields(listing = %listing))]
pub async fn list_links(client: &Client, listing: &Url, extension: &str) -> Vec<Url> {
    match fetch_listing(client, listing).await {
        Ok(html) => {
            let links = extract_links(&html, listing, extension);
            info!(count = links.len(), "found links");
            links
        }
        Err(e) => {
            error!("error getting urls: {:?}", e);
            Vec::new()
        }
    }
}

/// `.csv` links on the open-data listing page.
pub async fn list_csv_links(client: &Client, listing: &Url) -> Vec<Url> {
    list_links(client, listing, ".csv").await
}
