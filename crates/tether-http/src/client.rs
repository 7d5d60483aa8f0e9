//! Authenticated HTTP client.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use tether_core::error::InvalidInputError;
use tether_core::{Credential, Result, ServiceRegistry};

use crate::config::ClientConfig;
use crate::error::from_reqwest;

/// Per-request options for [`AuthenticatedClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Send without a credential and never refresh or retry (e.g. login).
    pub skip_auth: bool,
    /// Skip the pre-emptive refresh of an aging credential.
    pub skip_refresh: bool,
    /// Return a 401 as-is instead of refreshing and retrying.
    pub skip_retry: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }
}

/// HTTP client that authenticates with the primary credential.
///
/// Before each request an aging credential is refreshed on a best-effort
/// basis. A 401 triggers exactly one refresh and one retry; if that does not
/// help, the registry's logout escalation runs and the failing response is
/// returned. Every other status, success or not, is returned untouched.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http: reqwest::Client,
    registry: ServiceRegistry,
    config: ClientConfig,
}

impl AuthenticatedClient {
    /// Build a client with its own connection pool.
    pub fn new(registry: ServiceRegistry, config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(from_reqwest)?;
        Ok(Self::with_http_client(http, registry, config))
    }

    /// Build a client around an existing reqwest client.
    pub fn with_http_client(
        http: reqwest::Client,
        registry: ServiceRegistry,
        config: ClientConfig,
    ) -> Self {
        Self {
            http,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// The underlying reqwest client, e.g. to share with an
    /// [`EndpointService`](crate::EndpointService).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Issue a request, authenticating and recovering from a rejected
    /// credential as described on [`AuthenticatedClient`].
    ///
    /// # Errors
    ///
    /// Only transport failures (and unsendable credentials) are errors; HTTP
    /// error statuses are returned as responses.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Response> {
        let primary = self.config.primary_service.as_str();

        if !options.skip_auth && !options.skip_refresh {
            self.refresh_if_aging().await;
        }

        let credential = if options.skip_auth {
            None
        } else {
            self.registry.token(primary)
        };

        let response = self.send(url, &options, credential.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || options.skip_auth || options.skip_retry
        {
            return Ok(response);
        }

        info!("Received 401, refreshing credential and retrying once");
        let Some(refreshed) = self.registry.refresh(primary).await else {
            error!("Refresh after 401 failed, logging out");
            self.registry.logout();
            return Ok(response);
        };

        let retry = self.send(url, &options, Some(&refreshed)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            error!("Retry still unauthorized, logging out");
            self.registry.logout();
        }
        Ok(retry)
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(url, options.method(Method::GET)).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(url, options.method(Method::DELETE)).await
    }

    pub async fn post<B>(&self, url: &str, body: Option<&B>, options: RequestOptions) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::POST, url, body, options).await
    }

    pub async fn put<B>(&self, url: &str, body: Option<&B>, options: RequestOptions) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::PUT, url, body, options).await
    }

    pub async fn patch<B>(&self, url: &str, body: Option<&B>, options: RequestOptions) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        self.request_with_body(Method::PATCH, url, body, options).await
    }

    async fn request_with_body<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut options = options.method(method);
        if let Some(body) = body {
            if !options.headers.contains_key(CONTENT_TYPE) {
                options
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            options.body = Some(serde_json::to_vec(body)?);
        }
        self.request(url, options).await
    }

    async fn refresh_if_aging(&self) {
        let primary = self.config.primary_service.as_str();
        let Some(service) = self.registry.service(primary) else {
            return;
        };

        if service.token().is_none()
            || !service.is_expiring_soon(self.config.refresh_threshold_minutes)
        {
            return;
        }

        info!("Primary credential expiring soon, refreshing before request");
        if self.registry.refresh(primary).await.is_none() {
            warn!("Pre-emptive refresh failed, continuing with current credential");
        }
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        credential: Option<&Credential>,
    ) -> Result<Response> {
        let mut headers = options.headers.clone();
        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|e| {
                InvalidInputError::Header {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut request = self
            .http
            .request(options.method.clone(), url)
            .headers(headers);
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(from_reqwest)?;
        debug!(status = response.status().as_u16(), "Response received");
        Ok(response)
    }
}
