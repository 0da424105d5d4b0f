//! Subsonic-style search backend adapter.

use std::time::Duration;

use serde_json::Value;

use crate::backends::{SearchAuth, SearchBackend};
use crate::protocol::SearchHit;

const API_VERSION: &str = "1.16.1";
const CLIENT_ID: &str = "auxroom";

/// Subsonic-compatible adapter backed by `ureq`.
pub struct SubsonicSearchAdapter {
    http_client: ureq::Agent,
}

impl SubsonicSearchAdapter {
    /// Creates a new Subsonic search adapter.
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self { http_client }
    }

    fn make_salt() -> String {
        let mut bytes = [0u8; 8];
        let _ = getrandom::getrandom(&mut bytes);
        bytes.iter().map(|value| format!("{value:02x}")).collect()
    }

    fn auth_params(auth: &SearchAuth) -> Vec<(String, String)> {
        let salt = Self::make_salt();
        let token = format!("{:x}", md5::compute(format!("{}{}", auth.password, salt)));
        vec![
            ("u".to_string(), auth.username.clone()),
            ("t".to_string(), token),
            ("s".to_string(), salt),
            ("f".to_string(), "json".to_string()),
            ("v".to_string(), API_VERSION.to_string()),
            ("c".to_string(), CLIENT_ID.to_string()),
        ]
    }

    fn endpoint_base(endpoint: &str) -> String {
        endpoint.trim().trim_end_matches('/').to_string()
    }

    fn api_url(auth: &SearchAuth, method: &str, params: &[(String, String)]) -> String {
        let mut query_parts: Vec<String> = Self::auth_params(auth)
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect();
        query_parts.extend(
            params
                .iter()
                .map(|(key, value)| format!("{key}={}", urlencoding::encode(value))),
        );
        format!(
            "{}/rest/{}.view?{}",
            Self::endpoint_base(&auth.endpoint),
            method,
            query_parts.join("&")
        )
    }

    fn request_json(
        &self,
        auth: &SearchAuth,
        method: &str,
        params: &[(String, String)],
    ) -> Result<Value, String> {
        let url = Self::api_url(auth, method, params);
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("search request failed ({method}): {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("search response parse failed ({method}): {err}"))?;
        let status = parsed
            .get("subsonic-response")
            .and_then(|value| value.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if status != "ok" {
            let error_message = parsed
                .get("subsonic-response")
                .and_then(|value| value.get("error"))
                .and_then(|value| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("search backend returned an error");
            return Err(error_message.to_string());
        }
        Ok(parsed)
    }

    fn array_or_single(value: Option<&Value>) -> Vec<&Value> {
        match value {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(item @ Value::Object(_)) => vec![item],
            _ => Vec::new(),
        }
    }

    fn cover_art_url(auth: &SearchAuth, cover_id: &str) -> String {
        Self::api_url(
            auth,
            "getCoverArt",
            &[("id".to_string(), cover_id.to_string())],
        )
    }

    fn parse_song(auth: &SearchAuth, song: &Value) -> Option<SearchHit> {
        let id = song.get("id")?.as_str()?.to_string();
        let title = song
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Title")
            .to_string();
        let artist = song
            .get("artist")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let title = match artist {
            Some(artist) => format!("{artist} - {title}"),
            None => title,
        };
        let thumbnail_url = song
            .get("coverArt")
            .and_then(Value::as_str)
            .map(|cover_id| Self::cover_art_url(auth, cover_id))
            .unwrap_or_default();
        Some(SearchHit {
            id,
            title,
            thumbnail_url,
        })
    }
}

impl Default for SubsonicSearchAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for SubsonicSearchAdapter {
    fn search(
        &self,
        auth: &SearchAuth,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, String> {
        let payload = self.request_json(
            auth,
            "search3",
            &[
                ("query".to_string(), query.to_string()),
                ("songCount".to_string(), limit.to_string()),
                ("artistCount".to_string(), "0".to_string()),
                ("albumCount".to_string(), "0".to_string()),
            ],
        )?;
        let songs = Self::array_or_single(
            payload
                .get("subsonic-response")
                .and_then(|value| value.get("searchResult3"))
                .and_then(|value| value.get("song")),
        );
        Ok(songs
            .into_iter()
            .filter_map(|song| Self::parse_song(auth, song))
            .collect())
    }
}
