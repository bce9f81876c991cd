//! An HTTP client that fetches configuration from the App Configuration service.
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;

use crate::{configuration_source::ConfigurationSource, models::Configuration, Error, Result};

/// Everything needed to reach the configuration of one collection and environment.
#[derive(Debug, Clone)]
pub struct ConfigurationFetcherConfig {
    /// Region of the instance, e.g. `us-south`.
    pub region: String,
    /// Instance guid.
    pub guid: String,
    /// API key exchanged for IAM tokens.
    pub apikey: String,
    /// Collection to fetch.
    pub collection_id: String,
    /// Environment to fetch.
    pub environment_id: String,
    /// Replaces `https://{region}.apprapp.cloud.ibm.com` and the IAM host, for private or test
    /// deployments.
    pub override_server_host: Option<String>,
    /// Timeout of each HTTP request.
    pub request_timeout: Duration,
}

const IAM_URL: &str = "https://iam.cloud.ibm.com";
const IAM_TOKEN_ENDPOINT: &str = "/identity/token";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Tokens are renewed this long before they expire.
const TOKEN_EXPIRY_MARGIN: TimeDelta = TimeDelta::seconds(60);

pub(crate) const USER_AGENT: &str = concat!("appconfiguration-rust-sdk/", env!("CARGO_PKG_VERSION"));

/// A client that fetches configuration from the server.
pub struct ConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config_url: Url,
    authenticator: IamAuthenticator,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

impl ConfigurationFetcher {
    /// Create a new fetcher.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if the region or server host produce an invalid URL.
    /// - [`Error::Network`] if the HTTP client cannot be initialized.
    pub fn new(config: ConfigurationFetcherConfig) -> Result<ConfigurationFetcher> {
        let server_host = match &config.override_server_host {
            Some(host) => host.trim_end_matches('/').to_owned(),
            None => format!("https://{}.apprapp.cloud.ibm.com", config.region),
        };
        let iam_host = match &config.override_server_host {
            Some(host) => host.trim_end_matches('/'),
            None => IAM_URL,
        };

        let config_url = Url::parse_with_params(
            &format!(
                "{server_host}/apprapp/feature/v1/instances/{}/collections/{}/config",
                config.guid, config.collection_id
            ),
            &[("environment_id", &*config.environment_id)],
        )
        .map_err(Error::InvalidBaseUrl)?;
        let token_url = Url::parse(&format!("{iam_host}{IAM_TOKEN_ENDPOINT}"))
            .map_err(Error::InvalidBaseUrl)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(ConfigurationFetcher {
            client,
            config_url,
            authenticator: IamAuthenticator {
                token_url,
                apikey: config.apikey,
                token: None,
            },
            unauthorized: false,
        })
    }

    fn fetch(&mut self) -> Result<Configuration> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let token = self
            .authenticator
            .access_token(&self.client)
            .inspect_err(|err| self.mark_unauthorized(err))?;

        log::debug!(target: "appconfiguration", "fetching configuration");
        let response = self
            .client
            .get(self.config_url.clone())
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()?;

        let response = check_status(response).inspect_err(|err| self.mark_unauthorized(err))?;
        let bytes = response.bytes()?;
        let configuration = Configuration::from_json(&bytes)?;

        log::debug!(target: "appconfiguration",
                    features = configuration.features().len(),
                    properties = configuration.properties().len(),
                    segments = configuration.segments().len();
                    "successfully fetched configuration");
        Ok(configuration)
    }

    fn mark_unauthorized(&mut self, err: &Error) {
        if matches!(err, Error::Unauthorized) {
            log::warn!(target: "appconfiguration", "client is not authorized. Check your apikey");
            self.unauthorized = true;
        }
    }
}

impl ConfigurationSource for ConfigurationFetcher {
    fn fetch_configuration(&mut self) -> Result<Configuration> {
        self.fetch()
    }

    fn supports_live_updates(&self) -> bool {
        true
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
        status => {
            log::warn!(target: "appconfiguration", status = status.as_u16(); "received non-2xx response");
            Err(Error::UnexpectedStatus(status.as_u16()))
        }
    }
}

/// Exchanges the apikey for IAM bearer tokens and caches them until they are about to expire.
struct IamAuthenticator {
    token_url: Url,
    apikey: String,
    token: Option<CachedToken>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Expiration as a unix timestamp, in seconds.
    expiration: i64,
}

impl IamAuthenticator {
    fn access_token(&mut self, client: &reqwest::blocking::Client) -> Result<String> {
        if let Some(token) = &self.token {
            if Utc::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        log::debug!(target: "appconfiguration", "requesting IAM token");
        let response = client
            .post(self.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", self.apikey.as_str())])
            .send()?;

        // IAM answers 400 for an unknown apikey.
        let response = match response.status() {
            StatusCode::BAD_REQUEST => return Err(Error::Unauthorized),
            _ => check_status(response)?,
        };
        let token: TokenResponse = response.json()?;

        let expires_at = DateTime::from_timestamp(token.expiration, 0).unwrap_or_else(Utc::now);
        self.token = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}
