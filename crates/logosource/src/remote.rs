use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::MAX_INPUT_BYTES;

#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    /// Base URL serving uploaded logos as `<id>.png`.
    pub store_base: Option<Url>,
    /// Host of the `/api/user-logo` lookup used when the store misses.
    pub api_base: Option<Url>,
}

impl RemoteConfig {
    pub fn new(store_base: Option<&str>, api_base: Option<&str>) -> Result<Self> {
        let parse = |raw: &str, what: &str| -> Result<Url> {
            let mut url = Url::parse(raw).with_context(|| format!("invalid {what} '{raw}'"))?;
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            Ok(url)
        };
        Ok(Self {
            store_base: store_base.map(|raw| parse(raw, "store base")).transpose()?,
            api_base: api_base.map(|raw| parse(raw, "api base")).transpose()?,
        })
    }
}

/// Bytes pulled over HTTP together with the declared media type.
#[derive(Debug, Clone)]
pub struct Download {
    pub url: Url,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct UserLogoResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub struct LogoClient {
    http: Client,
    config: RemoteConfig,
}

impl LogoClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn fetch_url(&self, url: &str) -> Result<Download> {
        let url = Url::parse(url).with_context(|| format!("invalid logo url '{url}'"))?;
        self.download(url)
    }

    /// Fetches an uploaded logo by id, trying the blob store first and then
    /// asking the lookup API for the logo's location.
    pub fn fetch_stored(&self, id: &str) -> Result<Download> {
        if self.config.store_base.is_none() && self.config.api_base.is_none() {
            bail!("stored logo '{id}' requested but neither sources.store_base nor sources.api_base is configured");
        }

        if let Some(base) = &self.config.store_base {
            let url = base
                .join(&format!("{id}.png"))
                .context("joining store url")?;
            match self.download(url) {
                Ok(download) => return Ok(download),
                Err(err) if self.config.api_base.is_some() => {
                    warn!(logo = id, "store lookup failed, asking api: {err:#}");
                }
                Err(err) => return Err(err),
            }
        }

        let Some(api) = &self.config.api_base else {
            bail!("stored logo '{id}' not found and no api fallback configured");
        };
        let mut lookup = api.join("api/user-logo").context("joining api url")?;
        lookup.query_pairs_mut().append_pair("id", id);
        debug!(url = %lookup, "resolving stored logo through api");
        let response = self
            .http
            .get(lookup.clone())
            .send()
            .with_context(|| format!("requesting {lookup}"))?
            .error_for_status()
            .context("logo api returned an error status")?;
        let body: UserLogoResponse = response
            .json()
            .context("logo api response did not contain a url")?;
        let target = Url::parse(&body.url)
            .or_else(|_| lookup.join(&body.url))
            .with_context(|| format!("logo api returned an invalid url '{}'", body.url))?;
        self.download(target)
    }

    fn download(&self, url: Url) -> Result<Download> {
        debug!(%url, "downloading logo");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("logo request to {url} failed"))?;

        if let Some(len) = response.content_length() {
            if len > MAX_INPUT_BYTES {
                bail!("logo at {url} is {len} bytes; the limit is {MAX_INPUT_BYTES}");
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        response
            .take(MAX_INPUT_BYTES + 1)
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading body of {url}"))?;
        if bytes.len() as u64 > MAX_INPUT_BYTES {
            return Err(anyhow!(
                "logo at {url} exceeds the {MAX_INPUT_BYTES} byte limit"
            ));
        }

        Ok(Download {
            url,
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_gain_trailing_slash() {
        let config = RemoteConfig::new(
            Some("https://store.example.net/uploads"),
            Some("https://liquid.example.net"),
        )
        .unwrap();
        let store = config.store_base.unwrap();
        assert_eq!(store.as_str(), "https://store.example.net/uploads/");
        assert_eq!(
            store.join("abc.png").unwrap().as_str(),
            "https://store.example.net/uploads/abc.png"
        );
        let api = config.api_base.unwrap();
        assert_eq!(
            api.join("api/user-logo").unwrap().as_str(),
            "https://liquid.example.net/api/user-logo"
        );
    }

    #[test]
    fn rejects_malformed_base() {
        assert!(RemoteConfig::new(Some("not a url"), None).is_err());
    }

    #[test]
    fn stored_fetch_requires_a_source() {
        let client = LogoClient::new(RemoteConfig::default()).unwrap();
        let err = client.fetch_stored("abc").unwrap_err();
        assert!(err.to_string().contains("store_base"));
    }
}
