// Home Assistant REST client
//
// Wraps `reqwest::Client` with bearer-token auth, URL construction, and
// status/body handling. Every endpoint returns decoded wire types; the
// caller never sees raw responses.

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ApiStatus, HassState};
use crate::transport::TransportConfig;

/// Raw HTTP client for a Home Assistant instance.
///
/// The `base_url` is the hub root (e.g. `http://homeassistant.local:8123`
/// or a reverse-proxy prefix such as `https://host/ha-api`).
#[derive(Debug, Clone)]
pub struct HassClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HassClient {
    /// Create a client that authenticates with a long-lived access token.
    pub fn from_token(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_bearer_client(token)?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// The caller is responsible for any auth headers.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The hub base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/`: verifies the hub is reachable and the token is accepted.
    pub async fn check_api(&self) -> Result<ApiStatus, Error> {
        let url = self.api_url("")?;
        self.get(url).await
    }

    /// `GET /api/states`: snapshot of every entity the token can see.
    pub async fn fetch_states(&self) -> Result<Vec<HassState>, Error> {
        let url = self.api_url("states")?;
        let states: Vec<HassState> = self.get(url).await?;
        debug!(count = states.len(), "fetched entity states");
        Ok(states)
    }

    /// `GET /api/states/{entity_id}`: a single entity.
    pub async fn fetch_state(&self, entity_id: &str) -> Result<HassState, Error> {
        let url = self.api_url(&format!("states/{entity_id}"))?;
        self.get(url).await
    }

    /// `POST /api/services/{domain}/{service}` with a JSON body.
    ///
    /// Returns the states the hub reports as changed by the call.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &(impl Serialize + Sync),
    ) -> Result<Vec<HassState>, Error> {
        let url = self.api_url(&format!("services/{domain}/{service}"))?;
        self.post(url, data).await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{path}`, preserving any path prefix on the base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/api/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::parse_response(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::parse_response(resp).await
    }

    /// Map HTTP status codes onto [`Error`] and decode the JSON body.
    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "access token rejected".into(),
            });
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Forbidden {
                message: "token lacks permission for this endpoint (HTTP 403)".into(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(status = status.as_u16(), len = body.len(), "response received");

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }
}

/// First 200 bytes of a body, cut on a char boundary.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
