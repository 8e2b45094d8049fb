//! News search collaborator.
//!
//! The default source is Yahoo's finance search endpoint, which returns recent
//! news items alongside quote matches. It shares the [`YahooClient`] retry and
//! circuit-breaker policy with the price provider, so a ban observed on one
//! endpoint pauses the other.

use super::Outcome;
use crate::data::{DataError, YahooClient};
use serde::Deserialize;

const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";

/// Something that returns ranked headlines for a free-text query.
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    /// At most `limit` headlines, best match first.
    fn search(&self, query: &str, limit: usize) -> Outcome<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: Option<String>,
}

/// Yahoo Finance search-backed news.
#[derive(Debug, Clone)]
pub struct YahooNews {
    client: YahooClient,
}

impl YahooNews {
    pub fn new(client: YahooClient) -> Self {
        Self { client }
    }

    fn titles(response: SearchResponse, limit: usize) -> Vec<String> {
        response
            .news
            .into_iter()
            .filter_map(|item| item.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(limit)
            .collect()
    }
}

impl NewsSource for YahooNews {
    fn name(&self) -> &str {
        "yahoo_news"
    }

    fn search(&self, query: &str, limit: usize) -> Outcome<Vec<String>> {
        let params = [
            ("q", query.to_string()),
            ("quotesCount", "0".to_string()),
            ("newsCount", limit.to_string()),
        ];

        match self.client.get_json::<SearchResponse>(SEARCH_URL, &params, query) {
            Ok(response) => Outcome::Success(Self::titles(response, limit)),
            Err(DataError::CircuitBreakerTripped) => Outcome::Unavailable,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_titles_and_skips_blank_ones() {
        let json = r#"{
            "count": 3,
            "quotes": [],
            "news": [
                {"uuid": "a", "title": "Apple beats estimates", "publisher": "Reuters"},
                {"uuid": "b", "title": "   "},
                {"uuid": "c"},
                {"uuid": "d", "title": "iPhone sales surge"},
                {"uuid": "e", "title": "Third headline"}
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();

        let titles = YahooNews::titles(response, 2);
        assert_eq!(titles, vec!["Apple beats estimates", "iPhone sales surge"]);
    }

    #[test]
    fn missing_news_array_is_empty() {
        let response: SearchResponse = serde_json::from_str(r#"{"quotes": []}"#).unwrap();
        assert!(YahooNews::titles(response, 5).is_empty());
    }
}
