//! Authenticated request gateway.
//!
//! Every outbound call goes through here: the current credential is attached
//! as a bearer header, and HTTP 401 — the sole session-expiry signal — is
//! detected centrally. On 401 the gateway invalidates the credential in
//! memory and in the durable store and marks the session expired, then hands
//! the response back unchanged. It performs no retries and no automatic
//! re-authentication; it is a pure detection point.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ClientConfig, create_client};
use crate::credential::{Credential, SessionContext};
use crate::error::ClientError;
use crate::store::TokenStore;

#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: Url,
    session: SessionContext,
    store: Arc<dyn TokenStore>,
    request_timeout: Duration,
}

impl Gateway {
    pub fn new(
        config: &ClientConfig,
        session: SessionContext,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let client = create_client(config)?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            session,
            store,
            request_timeout: config.request_timeout,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Install a freshly issued credential and persist it.
    pub async fn install_credential(&self, token: &str) -> Result<(), ClientError> {
        self.session.install(Credential::new(token));
        self.store.save(token).await
    }

    /// Drop the credential in memory and in the durable store (logout).
    pub async fn discard_credential(&self) -> Result<(), ClientError> {
        self.session.clear();
        self.store.clear().await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::invalid_url(path, e.to_string()))
    }

    /// Execute a request with the current credential attached.
    ///
    /// The response is returned unchanged, including a 401; the expiry side
    /// effect has already run by the time the caller sees it. Transport
    /// errors surface unchanged.
    pub async fn request(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let builder = match self.session.credential() {
            Some(credential) => builder.bearer_auth(credential.token()),
            None => builder,
        };

        let response = builder.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.expire_session().await;
        }

        Ok(response)
    }

    async fn expire_session(&self) {
        warn!("credential rejected with HTTP 401, session expired");
        self.session.invalidate();
        // Clearing the durable store is best effort; the in-memory
        // invalidation above is what gates subsequent requests.
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear persisted credential");
        }
    }

    /// GET a control/poll endpoint; 401 maps to `AuthExpired`, other
    /// non-success statuses to `HttpStatus`.
    pub async fn get(&self, path: &'static str) -> Result<Response, ClientError> {
        let url = self.endpoint(path)?;
        debug!(%url, "gateway GET");
        let mut builder = self.client.get(url);
        if !self.request_timeout.is_zero() {
            builder = builder.timeout(self.request_timeout);
        }
        let response = self.request(builder).await?;
        Self::check(response, path)
    }

    /// GET a control/poll endpoint and deserialize its JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &'static str,
    ) -> Result<T, ClientError> {
        let response = self.get(path).await?;
        response.json::<T>().await.map_err(ClientError::from)
    }

    /// POST a JSON body to a control endpoint.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<Response, ClientError> {
        let url = self.endpoint(path)?;
        debug!(%url, "gateway POST");
        let mut builder = self.client.post(url).json(body);
        if !self.request_timeout.is_zero() {
            builder = builder.timeout(self.request_timeout);
        }
        let response = self.request(builder).await?;
        Self::check(response, path)
    }

    /// POST without attaching a credential and without the expiry side
    /// effect. Used by the login flow, where a 401 means bad credentials,
    /// not an expired session.
    pub async fn post_json_public<B: Serialize + ?Sized>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<Response, ClientError> {
        let url = self.endpoint(path)?;
        let mut builder = self.client.post(url).json(body);
        if !self.request_timeout.is_zero() {
            builder = builder.timeout(self.request_timeout);
        }
        builder.send().await.map_err(ClientError::from)
    }

    /// GET the open-ended streaming endpoint. No per-request timeout: the
    /// response body is an indefinite multipart stream.
    pub async fn get_stream(&self, path: &'static str) -> Result<Response, ClientError> {
        let url = self.endpoint(path)?;
        debug!(%url, "gateway streaming GET");
        let response = self.request(self.client.get(url)).await?;
        Self::check(response, path)
    }

    fn check(response: Response, operation: &'static str) -> Result<Response, ClientError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ClientError::AuthExpired),
            status => Err(ClientError::http_status(status, operation)),
        }
    }
}
