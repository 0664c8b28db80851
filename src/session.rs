//! Session state: the authentication token, its lease bookkeeping, and the
//! single-flight re-authentication discipline.
//!
//! The token is the one piece of shared mutable state in the crate. It is
//! owned here and mutated nowhere else; concurrent demands for a fresh token
//! share one in-flight login exchange and observe its result together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::constants::TOKEN_LEASE_MARGIN_SECS;
use crate::error::{ReolinkError, Result};
use crate::normalize::{field_i64, field_str, get_ci};
use crate::protocol::{CommandEnvelope, decode_batch, encode_batch};
use crate::transport::{Method, Transport};

/// How credentials travel on the wire. Fixed at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Obtain a token once via `Login` and reuse it until rejected/expired.
    Persistent,
    /// Attach raw credentials to every exchange; nothing is cached.
    PerRequest,
}

/// The active token and its expiry bookkeeping. Replaced wholesale on every
/// re-authentication.
#[derive(Debug, Clone)]
pub(crate) struct CredentialContext {
    pub token: String,
    issued_at: Instant,
    lease: Duration,
}

impl CredentialContext {
    fn new(token: String, lease_secs: u64) -> Self {
        Self {
            token,
            issued_at: Instant::now(),
            lease: Duration::from_secs(lease_secs),
        }
    }

    /// Valid while inside the lease, minus a small margin so a token is
    /// never presented right at its expiry edge.
    fn is_valid(&self) -> bool {
        self.issued_at.elapsed() + Duration::from_secs(TOKEN_LEASE_MARGIN_SECS) < self.lease
    }
}

/// What a login flight needs to reach the device. Owned clones so the
/// flight future is `'static`.
pub(crate) struct LoginRequest {
    pub transport: Arc<dyn Transport>,
    pub endpoint: Url,
    pub username: String,
    pub password: String,
}

type LoginFlight = Shared<BoxFuture<'static, std::result::Result<CredentialContext, ReolinkError>>>;

#[derive(Default)]
struct AuthSlot {
    ctx: Option<CredentialContext>,
    flight: Option<LoginFlight>,
}

/// Owns the credential context. State machine:
/// `Unauthenticated -> Authenticated -> (rejected) -> Unauthenticated -> ...
/// -> Closed`, where `Closed` is terminal.
pub(crate) struct SessionManager {
    slot: Mutex<AuthSlot>,
    closed: AtomicBool,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(AuthSlot::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// A valid token, authenticating first if none is held.
    ///
    /// Callers arriving while a login is in flight await that same flight
    /// and share its outcome; at most one login exchange is in progress per
    /// session at any time.
    pub(crate) async fn current_token(self: &Arc<Self>, request: LoginRequest) -> Result<String> {
        if self.is_closed() {
            return Err(ReolinkError::Closed);
        }

        let flight = {
            let mut slot = self.slot.lock().expect("session lock poisoned");
            if let Some(ctx) = &slot.ctx
                && ctx.is_valid()
            {
                return Ok(ctx.token.clone());
            }
            match &slot.flight {
                Some(flight) => flight.clone(),
                None => {
                    let manager = Arc::downgrade(self);
                    let flight = Self::spawn_flight(manager, request);
                    slot.flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await.map(|ctx| ctx.token)
    }

    fn spawn_flight(manager: Weak<Self>, request: LoginRequest) -> LoginFlight {
        async move {
            let result = login(&request).await;
            if let Some(manager) = manager.upgrade() {
                let mut slot = manager.slot.lock().expect("session lock poisoned");
                slot.flight = None;
                // A close that raced the flight wins; the token was never
                // handed out, so there is nothing to store or revoke.
                if !manager.is_closed()
                    && let Ok(ctx) = &result
                {
                    slot.ctx = Some(ctx.clone());
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drop the context locally without contacting the device, but only
    /// while it still holds the rejected token. A context refreshed by a
    /// concurrent operation in the meantime stays in place, so a late
    /// rejection of the superseded token never forces a second login.
    pub(crate) fn invalidate(&self, rejected: &str) {
        let mut slot = self.slot.lock().expect("session lock poisoned");
        if slot.ctx.as_ref().is_some_and(|ctx| ctx.token == rejected) {
            slot.ctx = None;
        }
    }

    pub(crate) fn has_token(&self) -> bool {
        let slot = self.slot.lock().expect("session lock poisoned");
        slot.ctx.as_ref().is_some_and(CredentialContext::is_valid)
    }

    /// Transition to `Closed`, yielding the held token (for the best-effort
    /// logout). Returns `None` when already closed.
    pub(crate) fn close(&self) -> Option<Option<String>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut slot = self.slot.lock().expect("session lock poisoned");
        Some(slot.ctx.take().map(|ctx| ctx.token))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Perform the `Login` exchange directly through the transport. This path
/// never goes through the retry engine; a failed login is terminal for its
/// flight.
async fn login(request: &LoginRequest) -> Result<CredentialContext> {
    debug!("authenticating against {}", request.endpoint.host_str().unwrap_or("device"));

    let envelope = CommandEnvelope::new(
        "Login",
        json!({
            "User": {
                "userName": request.username,
                "password": request.password,
            }
        }),
    );

    let mut url = request.endpoint.clone();
    url.query_pairs_mut().append_pair("cmd", "Login");

    let body = encode_batch(std::slice::from_ref(&envelope))?;
    let exchange = request
        .transport
        .execute(Method::Post, url, Some(body))
        .await?;

    if exchange.status == 401 {
        return Err(ReolinkError::Auth {
            code: i64::from(exchange.status),
            detail: "device rejected login with HTTP 401".to_string(),
        });
    }
    if !(200..300).contains(&exchange.status) {
        return Err(ReolinkError::Transport(format!(
            "login exchange answered HTTP {}",
            exchange.status
        )));
    }

    let entry = decode_batch(&exchange.body, 1)?
        .into_iter()
        .next()
        .expect("decode_batch guarantees one entry");

    // Any failure entry on login is an authentication failure, whatever the
    // device code; the code and detail are preserved for diagnostics.
    let value = entry.into_value().map_err(|err| match err {
        auth @ ReolinkError::Auth { .. } => auth,
        other => ReolinkError::Auth {
            code: other.device_code().unwrap_or(0),
            detail: other.to_string(),
        },
    })?;

    let token = get_ci(&value, "Token").ok_or_else(|| {
        ReolinkError::Normalization("login response carries no token object".to_string())
    })?;
    let name = field_str(token, &["name"]).ok_or_else(|| {
        ReolinkError::Normalization("login token carries no name".to_string())
    })?;
    let lease = field_i64(token, &["leaseTime"]).unwrap_or(3600);
    if lease <= 0 {
        warn!(lease, "device reported a non-positive token lease");
    }

    Ok(CredentialContext::new(name, lease.max(1) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_valid_inside_its_lease() {
        let ctx = CredentialContext::new("tok".into(), 3600);
        assert!(ctx.is_valid());
    }

    #[test]
    fn context_expires_within_the_margin() {
        // A lease shorter than the safety margin is never usable.
        let ctx = CredentialContext::new("tok".into(), TOKEN_LEASE_MARGIN_SECS);
        assert!(!ctx.is_valid());
    }

    #[test]
    fn close_is_terminal_and_yields_the_token_once() {
        let manager = SessionManager::new();
        {
            let mut slot = manager.slot.lock().unwrap();
            slot.ctx = Some(CredentialContext::new("tok".into(), 3600));
        }
        assert_eq!(manager.close(), Some(Some("tok".into())));
        assert!(manager.is_closed());
        assert_eq!(manager.close(), None);
    }

    #[test]
    fn invalidate_clears_the_context_it_witnessed() {
        let manager = SessionManager::new();
        {
            let mut slot = manager.slot.lock().unwrap();
            slot.ctx = Some(CredentialContext::new("tok".into(), 3600));
        }
        assert!(manager.has_token());
        manager.invalidate("tok");
        assert!(!manager.has_token());
    }

    #[test]
    fn invalidate_ignores_a_superseded_token() {
        let manager = SessionManager::new();
        {
            let mut slot = manager.slot.lock().unwrap();
            slot.ctx = Some(CredentialContext::new("fresh".into(), 3600));
        }
        // The rejection names a token that was already replaced.
        manager.invalidate("stale");
        assert!(manager.has_token());
    }

    struct SlowLoginTransport;

    #[async_trait::async_trait]
    impl Transport for SlowLoginTransport {
        async fn execute(
            &self,
            _method: Method,
            _url: Url,
            _body: Option<Vec<u8>>,
        ) -> Result<crate::transport::Exchange> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let body = serde_json::to_vec(&json!([
                {"cmd": "Login", "code": 0, "value": {"Token": {"name": "tok", "leaseTime": 3600}}}
            ]))
            .unwrap();
            Ok(crate::transport::Exchange { status: 200, body })
        }
    }

    #[tokio::test]
    async fn login_finishing_after_close_does_not_resurrect_the_session() {
        let manager = Arc::new(SessionManager::new());
        let request = LoginRequest {
            transport: Arc::new(SlowLoginTransport),
            endpoint: Url::parse("http://192.0.2.1/cgi-bin/api.cgi").unwrap(),
            username: "admin".into(),
            password: "secret".into(),
        };

        let flight = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.current_token(request).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.close(), Some(None));
        flight.await.unwrap().unwrap();

        assert!(!manager.has_token());
    }
}
