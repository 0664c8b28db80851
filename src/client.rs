use std::sync::Arc;

use serde_json::json;
use tokio::sync::OnceCell;
use tokio::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::constants::{API_PATH, HTTP_PORT, HTTPS_PORT};
use crate::error::{ReolinkError, Result};
use crate::normalize::Capabilities;
use crate::protocol::{CommandEnvelope, ResultEntry, decode_batch, encode_batch};
use crate::session::{LoginRequest, SessionManager, SessionMode};
use crate::transport::{Exchange, HttpTransport, Method, Transport};

/// Outcome of one physical exchange, before retry handling.
enum Outcome {
    Entries(Vec<ResultEntry>),
    /// HTTP 401 — the same token-rejection signal as device code −6.
    Unauthorized,
}

/// Client for one camera or NVR. Owns the session, the transport, and the
/// retry discipline; the command traits in [`crate::commands`] are thin
/// wrappers over [`ReolinkClient::submit`].
pub struct ReolinkClient {
    host: String,
    port: Option<u16>,
    https: bool,
    insecure: bool,
    timeout: Duration,
    mode: SessionMode,
    username: String,
    password: String,

    pub(crate) session: Arc<SessionManager>,
    transport: OnceCell<Arc<dyn Transport>>,
    abilities: OnceCell<Capabilities>,
}

impl ReolinkClient {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            https: true,
            insecure: false,
            timeout: Duration::from_secs(10),
            mode: SessionMode::Persistent,
            username: username.into(),
            password: password.into(),
            session: Arc::new(SessionManager::new()),
            transport: OnceCell::new(),
            abilities: OnceCell::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Skip TLS certificate validation. Most of these devices ship
    /// self-signed certificates, so strict validation often cannot work.
    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Inject a transport implementation instead of the built-in HTTP one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = OnceCell::new_with(Some(transport));
        self
    }

    // ── Session metadata ─────────────────────────────────────────────

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Whether a valid (unexpired) token is currently held.
    pub fn is_authenticated(&self) -> bool {
        self.session.has_token()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    // ── Engine plumbing ──────────────────────────────────────────────

    fn endpoint(&self) -> Result<Url> {
        let scheme = if self.https { "https" } else { "http" };
        let port = self.port.unwrap_or(if self.https { HTTPS_PORT } else { HTTP_PORT });
        Url::parse(&format!("{scheme}://{}:{port}{API_PATH}", self.host))
            .map_err(|e| ReolinkError::Transport(format!("invalid device URL: {e}")))
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .get_or_try_init(|| async {
                let transport = HttpTransport::new(self.timeout, self.insecure)?;
                Ok::<Arc<dyn Transport>, ReolinkError>(Arc::new(transport))
            })
            .await
            .map(Arc::clone)
    }

    /// Attach the mode-appropriate credentials to a request URL. Returns the
    /// token that signed the request (none in per-request mode) so a later
    /// rejection can name exactly the token the device saw.
    async fn sign_url(&self, url: &mut Url) -> Result<Option<String>> {
        match self.mode {
            SessionMode::PerRequest => {
                url.query_pairs_mut()
                    .append_pair("user", &self.username)
                    .append_pair("password", &self.password);
                Ok(None)
            }
            SessionMode::Persistent => {
                let token = self
                    .session
                    .current_token(LoginRequest {
                        transport: self.transport().await?,
                        endpoint: self.endpoint()?,
                        username: self.username.clone(),
                        password: self.password.clone(),
                    })
                    .await?;
                url.query_pairs_mut().append_pair("token", &token);
                Ok(Some(token))
            }
        }
    }

    async fn exchange_batch(&self, commands: &[CommandEnvelope]) -> Result<(Outcome, Option<String>)> {
        let mut url = self.endpoint()?;
        url.query_pairs_mut().append_pair("cmd", &commands[0].cmd);
        let token = self.sign_url(&mut url).await?;

        let body = encode_batch(commands)?;
        trace!(commands = commands.len(), cmd = %commands[0].cmd, "submitting batch");

        let exchange = self
            .transport()
            .await?
            .execute(Method::Post, url, Some(body))
            .await?;

        if exchange.status == 401 {
            return Ok((Outcome::Unauthorized, token));
        }
        if !(200..300).contains(&exchange.status) {
            return Err(ReolinkError::Transport(format!(
                "device answered HTTP {}",
                exchange.status
            )));
        }

        let entries = decode_batch(&exchange.body, commands.len())?;
        Ok((Outcome::Entries(entries), token))
    }

    /// Submit one or more command envelopes as a single physical exchange.
    ///
    /// The returned entries preserve submission order; that order is the
    /// only correlation between an envelope and its result. A token
    /// rejection invalidates the whole batch, re-authenticates, and resubmits
    /// the identical batch exactly once; a second rejection surfaces as an
    /// authentication error. No other failure class is retried here.
    pub async fn submit(&self, commands: &[CommandEnvelope]) -> Result<Vec<ResultEntry>> {
        if commands.is_empty() {
            // Pure no-op; batch callers build variable-length command lists.
            return Ok(Vec::new());
        }
        if self.session.is_closed() {
            return Err(ReolinkError::Closed);
        }

        match self.exchange_batch(commands).await? {
            (Outcome::Entries(entries), _) if !batch_rejected(&entries) => Ok(entries),
            (first, token) => {
                let first_rejection = rejection_error(&first);
                if self.mode == SessionMode::PerRequest {
                    // Raw credentials were on the request; a re-login cannot
                    // change what the device just rejected.
                    return Err(first_rejection);
                }

                debug!("token rejected, re-authenticating and resubmitting batch");
                if let Some(token) = token {
                    self.session.invalidate(&token);
                }

                match self.exchange_batch(commands).await? {
                    (Outcome::Entries(entries), _) if !batch_rejected(&entries) => Ok(entries),
                    (second, _) => Err(rejection_error(&second)),
                }
            }
        }
    }

    /// Submit one command and unwrap its value.
    pub(crate) async fn get_command(&self, cmd: &str, param: serde_json::Value) -> Result<serde_json::Value> {
        let envelope = CommandEnvelope::new(cmd, param);
        self.submit(std::slice::from_ref(&envelope))
            .await?
            .remove(0)
            .into_value()
    }

    /// Submit one write command, discarding the acknowledgement value.
    pub(crate) async fn set_command(&self, cmd: &str, param: serde_json::Value) -> Result<()> {
        self.get_command(cmd, param).await.map(drop)
    }

    /// GET a binary payload (snapshot, file download). A JSON body where an
    /// image was expected is the device's error envelope; it is decoded and
    /// classified rather than returned as bytes.
    pub async fn fetch_binary(&self, cmd: &str, params: &[(&str, &str)]) -> Result<Vec<u8>> {
        if self.session.is_closed() {
            return Err(ReolinkError::Closed);
        }

        // Same retry discipline as `submit`: one resubmission after a
        // token rejection, then terminal.
        for attempt in 0..2 {
            let mut url = self.endpoint()?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("cmd", cmd);
                for (key, value) in params {
                    pairs.append_pair(key, value);
                }
            }
            let token = self.sign_url(&mut url).await?;

            let exchange = self.transport().await?.execute(Method::Get, url, None).await?;

            match classify_binary(exchange)? {
                BinaryOutcome::Bytes(bytes) => return Ok(bytes),
                BinaryOutcome::TokenRejected(err) => {
                    if self.mode == SessionMode::PerRequest || attempt == 1 {
                        return Err(err);
                    }
                    debug!("token rejected on binary fetch, re-authenticating");
                    if let Some(token) = token {
                        self.session.invalidate(&token);
                    }
                }
            }
        }
        unreachable!("binary fetch loop returns within two attempts")
    }

    /// The device's feature set, queried lazily once per session.
    ///
    /// The ability table is device-static, so it never expires while the
    /// session lives; concurrent first calls share one query.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        self.abilities
            .get_or_try_init(|| async {
                let envelope = CommandEnvelope::new(
                    "GetAbility",
                    json!({"User": {"userName": self.username}}),
                );
                let value = self
                    .submit(std::slice::from_ref(&envelope))
                    .await?
                    .remove(0)
                    .into_value()?;
                Ok::<_, ReolinkError>(Capabilities::from_response(&value))
            })
            .await
            .map(Clone::clone)
    }

    /// Close the session. Attempts a best-effort server-side logout, then
    /// marks the session terminally closed; in-flight operations complete
    /// or fail on their own, new ones are rejected immediately.
    pub async fn close(&self) {
        let Some(token) = self.session.close() else {
            return; // already closed
        };

        let Some(token) = token else {
            return; // never authenticated, nothing to revoke
        };

        let logout = async {
            let mut url = self.endpoint()?;
            url.query_pairs_mut()
                .append_pair("cmd", "Logout")
                .append_pair("token", &token);
            let body = encode_batch(&[CommandEnvelope::bare("Logout")])?;
            self.transport()
                .await?
                .execute(Method::Post, url, Some(body))
                .await
        };

        if let Err(err) = logout.await {
            debug!(%err, "best-effort logout failed");
        }
    }
}

fn batch_rejected(entries: &[ResultEntry]) -> bool {
    entries.iter().any(ResultEntry::is_token_rejection)
}

/// The classified authentication error for a rejected exchange.
fn rejection_error(outcome: &Outcome) -> ReolinkError {
    match outcome {
        Outcome::Unauthorized => ReolinkError::Auth {
            code: 401,
            detail: "device answered HTTP 401 unauthorized".to_string(),
        },
        Outcome::Entries(entries) => entries
            .iter()
            .find_map(|entry| match entry {
                ResultEntry::Failure { code, detail } if entry.is_token_rejection() => {
                    Some(ReolinkError::Auth {
                        code: *code,
                        detail: detail.clone(),
                    })
                }
                _ => None,
            })
            .unwrap_or_else(|| ReolinkError::Auth {
                code: 0,
                detail: "token rejected".to_string(),
            }),
    }
}

enum BinaryOutcome {
    Bytes(Vec<u8>),
    TokenRejected(ReolinkError),
}

fn classify_binary(exchange: Exchange) -> Result<BinaryOutcome> {
    if exchange.status == 401 {
        return Ok(BinaryOutcome::TokenRejected(ReolinkError::Auth {
            code: 401,
            detail: "device answered HTTP 401 unauthorized".to_string(),
        }));
    }
    if !(200..300).contains(&exchange.status) {
        return Err(ReolinkError::Transport(format!(
            "device answered HTTP {}",
            exchange.status
        )));
    }

    // Image payloads never start with a JSON bracket.
    let looks_like_json = exchange
        .body
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[' || *b == b'{');
    if !looks_like_json {
        return Ok(BinaryOutcome::Bytes(exchange.body));
    }

    let entry = match decode_batch(&exchange.body, 1) {
        Ok(mut entries) => entries.remove(0),
        // Not the error envelope after all; hand the bytes through.
        Err(_) => return Ok(BinaryOutcome::Bytes(exchange.body)),
    };

    if entry.is_token_rejection() {
        return Ok(BinaryOutcome::TokenRejected(rejection_error(
            &Outcome::Entries(vec![entry]),
        )));
    }
    match entry.into_value() {
        Ok(_) => Err(ReolinkError::Normalization(
            "expected a binary payload but the device answered JSON".to_string(),
        )),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_submit_is_a_pure_noop() {
        // No transport is ever built for an empty batch.
        let client = ReolinkClient::new("192.0.2.1", "admin", "secret");
        let entries = client.submit(&[]).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn operations_after_close_fail_fast() {
        let client = ReolinkClient::new("192.0.2.1", "admin", "secret");
        client.close().await;
        assert!(client.is_closed());
        let err = client
            .submit(&[CommandEnvelope::bare("GetDevInfo")])
            .await
            .unwrap_err();
        assert!(matches!(err, ReolinkError::Closed));
        let err = client.fetch_binary("Snap", &[]).await.unwrap_err();
        assert!(matches!(err, ReolinkError::Closed));
    }
}
