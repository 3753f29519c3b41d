use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
};
use tracing::debug;

use crate::config::AppConfig;
use crate::pages::{PageError, PageSource};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Plain GET transport for sites that render server-side.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn from_config(config: &AppConfig) -> Result<Self, PageError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        let language = HeaderValue::from_str(&config.accept_language)
            .map_err(|err| PageError::Launch(format!("invalid accept-language: {err}")))?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|err| PageError::Launch(format!("http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> Result<String, PageError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().map_err(|err| failure(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|err| failure(url, err))
    }
}

fn failure(url: &str, err: reqwest::Error) -> PageError {
    if err.is_timeout() {
        PageError::Timeout(url.to_string())
    } else {
        PageError::Navigation {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

impl PageSource for HttpFetcher {
    fn listing(&mut self, url: &str, _scrolls: u32) -> Result<String, PageError> {
        self.get(url)
    }

    fn detail(&mut self, url: &str) -> Result<String, PageError> {
        self.get(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        assert!(HttpFetcher::from_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn rejects_unencodable_language_header() {
        let config = AppConfig {
            accept_language: "tr\nTR".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            HttpFetcher::from_config(&config),
            Err(PageError::Launch(_))
        ));
    }
}
