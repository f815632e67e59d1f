use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::config::{ClientSettings, SearchParameters};
use crate::domain::{SearchDatabase, Usi};
use crate::error::MasstError;

/// A single request against one fastMASST index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub usi: Usi,
    pub database: SearchDatabase,
    pub analog: bool,
    pub precursor_mz_tol: f64,
    pub mz_tol: f64,
    pub min_cos: f64,
    pub analog_mass_below: f64,
    pub analog_mass_above: f64,
}

impl SearchQuery {
    /// Query against the public data index, analog mode as configured.
    pub fn public_data(usi: Usi, params: &SearchParameters) -> Self {
        Self {
            usi,
            database: params.database,
            analog: params.analog,
            precursor_mz_tol: params.precursor_mz_tol,
            mz_tol: params.mz_tol,
            min_cos: params.min_cos,
            analog_mass_below: params.analog_mass_below,
            analog_mass_above: params.analog_mass_above,
        }
    }

    /// Query against the reference library, never in analog mode.
    pub fn library(usi: Usi, params: &SearchParameters) -> Self {
        Self {
            database: params.library,
            analog: false,
            ..Self::public_data(usi, params)
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("usi", self.usi.to_string()),
            ("library", self.database.to_string()),
            ("analog", if self.analog { "Yes" } else { "No" }.to_string()),
            ("pm_tolerance", self.precursor_mz_tol.to_string()),
            ("fragment_tolerance", self.mz_tol.to_string()),
            ("cosine_threshold", self.min_cos.to_string()),
        ];
        if self.analog {
            pairs.push(("delta_mass_below", self.analog_mass_below.to_string()));
            pairs.push(("delta_mass_above", self.analog_mass_above.to_string()));
        }
        pairs
    }

    fn cache_key(&self) -> String {
        self.query_pairs()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub trait FasstClient: Send + Sync {
    /// Returns the parsed JSON body of a successful search.
    fn search(&self, query: &SearchQuery) -> Result<Value, MasstError>;
}

#[derive(Clone)]
pub struct FasstHttpClient {
    client: Client,
    base_url: String,
    cache: Option<ResponseCache>,
}

impl FasstHttpClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, MasstError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("masst-tree/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MasstError::SearchHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| MasstError::SearchHttp(err.to_string()))?;

        let cache = match settings.cache_expiry_hours {
            None => None,
            Some(hours) => {
                let expire_after = Duration::from_secs(hours * 3600);
                Some(match &settings.cache_dir {
                    Some(dir) => ResponseCache::new_with_root(dir.clone(), expire_after),
                    None => ResponseCache::new(expire_after)?,
                })
            }
        };

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            cache,
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, MasstError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(MasstError::SearchHttp(err.to_string()));
                }
            }
        }
    }
}

impl FasstClient for FasstHttpClient {
    fn search(&self, query: &SearchQuery) -> Result<Value, MasstError> {
        let key = query.cache_key();
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.get(&key) {
                debug!(usi = %query.usi, database = %query.database, "fastMASST cache hit");
                return Ok(value);
            }
        }

        let pairs = query.query_pairs();
        let response = self.send_with_retries(|| self.client.get(&self.base_url).query(&pairs))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "fastMASST request failed".to_string());
            return Err(MasstError::SearchStatus { status, message });
        }
        let value: Value = response
            .json()
            .map_err(|err| MasstError::SearchResponse(err.to_string()))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(&key, &value) {
                debug!(error = %err, "failed to cache fastMASST response");
            }
        }
        Ok(value)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analog_window_only_in_analog_queries() {
        let usi: Usi = "CCMSLIB00005883671".parse().unwrap();
        let params = SearchParameters {
            analog: true,
            ..SearchParameters::default()
        };
        let public = SearchQuery::public_data(usi.clone(), &params);
        let library = SearchQuery::library(usi, &params);

        let public_pairs = public.query_pairs();
        assert!(public_pairs.contains(&("analog", "Yes".to_string())));
        assert!(public_pairs.contains(&("delta_mass_below", "130".to_string())));
        assert!(public_pairs.contains(&(
            "library",
            "metabolomicspanrepo_index_latest".to_string()
        )));

        let library_pairs = library.query_pairs();
        assert!(library_pairs.contains(&("analog", "No".to_string())));
        assert!(library_pairs.contains(&("library", "gnpslibrary".to_string())));
        assert!(library_pairs.iter().all(|(key, _)| *key != "delta_mass_below"));
    }

    #[test]
    fn cache_key_distinguishes_databases() {
        let usi: Usi = "CCMSLIB00005883671".parse().unwrap();
        let params = SearchParameters::default();
        assert_ne!(
            SearchQuery::public_data(usi.clone(), &params).cache_key(),
            SearchQuery::library(usi, &params).cache_key()
        );
    }
}
