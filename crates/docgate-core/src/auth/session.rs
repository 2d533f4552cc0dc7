use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiRequest, GateError, Transport};
use crate::storage::SessionStorage;

/// Storage key holding the bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Storage key holding the serialized `SessionDescriptor`
pub const USER_DATA_KEY: &str = "user_data";

/// Freshness window: credentials older than this are treated as expired
/// regardless of what the server thinks.
pub const SESSION_TTL_HOURS: i64 = 24;

const LOGIN_PATH: &str = "/api/auth/login";

/// Reported when a rejected login carries no usable message
const GENERIC_LOGIN_FAILURE: &str = "Login failed";

/// The bearer token and the instant it was issued.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Persisted next to the token: who logged in and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionDescriptor {
    pub username: String,
    #[serde(rename = "loginTime")]
    pub login_time: String,
}

impl SessionDescriptor {
    pub fn new(username: &str, issued_at: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            login_time: issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.login_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// A live session as read in one consistent snapshot.
#[derive(Debug, Clone)]
pub(crate) struct LiveSession {
    pub credential: Credential,
    pub username: String,
    pub epoch: u64,
}

/// What the storage currently holds.
enum Stored {
    Absent,
    Live(LiveSession),
    Expired { epoch: u64 },
    Corrupt { epoch: u64, reason: String },
}

/// Owns the session credential and decides whether it is still live.
///
/// Every login and teardown bumps a session epoch. Anything derived from a
/// session (loaded permissions, in-flight calls) remembers the epoch it was
/// produced under and is discarded once the epoch has moved on.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    transport: Arc<dyn Transport>,
    ttl: Duration,
    // Guards the token/descriptor pair; the value is the session epoch
    epoch: RwLock<u64>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, transport: Arc<dyn Transport>) -> Self {
        Self {
            storage,
            transport,
            ttl: Duration::hours(SESSION_TTL_HOURS),
            epoch: RwLock::new(0),
        }
    }

    /// Override the freshness window
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Authenticate against the backend and persist the returned token.
    ///
    /// Nothing is stored unless the whole credential could be persisted.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, GateError> {
        let request = ApiRequest::post(LOGIN_PATH).json(serde_json::json!({
            "username": username,
            "password": password,
        }));

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(username = username, error = %e, "Login request failed");
            e
        })?;

        if !response.is_success() {
            let body: LoginErrorBody = response.json().unwrap_or_default();
            let message = body
                .message
                .or(body.error)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string());
            warn!(
                username = username,
                status = response.status.as_u16(),
                "Login rejected"
            );
            return Err(GateError::InvalidCredentials(message));
        }

        let token = response
            .json::<LoginResponse>()?
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GateError::InvalidResponse("Login response has no token".to_string()))?;

        let issued_at = Utc::now();
        self.commit(username, &token, issued_at)?;
        info!(username = username, "Logged in");

        Ok(Credential { token, issued_at })
    }

    /// True iff a credential is stored and still inside the freshness window.
    ///
    /// Expired or corrupt session data is torn down as a side effect.
    pub fn is_live(&self) -> bool {
        self.live_session().is_some()
    }

    /// Discard the credential and everything derived from it.
    pub fn teardown(&self) {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        self.clear_storage();
        *epoch += 1;
        info!("Session torn down");
    }

    /// Username of the live session
    pub fn current_identity(&self) -> Option<String> {
        self.live_session().map(|s| s.username)
    }

    /// The live credential, if any
    pub fn credential(&self) -> Option<Credential> {
        self.live_session().map(|s| s.credential)
    }

    /// Fails with `SessionInvalid` unless a live session exists.
    pub fn require_auth(&self) -> Result<(), GateError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(GateError::SessionInvalid)
        }
    }

    /// When the live credential leaves its freshness window
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credential().map(|c| c.issued_at + self.ttl)
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at().map(|at| at - Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.time_until_expiry().map(|d| d.num_minutes().max(0))
    }

    pub(crate) fn epoch(&self) -> u64 {
        *self.epoch.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the live session, self-healing expired or corrupt state.
    pub(crate) fn live_session(&self) -> Option<LiveSession> {
        match self.inspect() {
            Stored::Live(session) => Some(session),
            Stored::Absent => None,
            Stored::Expired { epoch } => {
                info!("Session outside freshness window");
                self.teardown_if_epoch(epoch);
                None
            }
            Stored::Corrupt { epoch, reason } => {
                warn!(reason = %reason, "Discarding corrupt session data");
                self.teardown_if_epoch(epoch);
                None
            }
        }
    }

    /// Tear down only if no login or teardown happened since `expected` was read.
    pub(crate) fn teardown_if_epoch(&self, expected: u64) -> bool {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        if *epoch != expected {
            return false;
        }
        self.clear_storage();
        *epoch += 1;
        info!("Session torn down");
        true
    }

    fn inspect(&self) -> Stored {
        let guard = self.epoch.read().unwrap_or_else(PoisonError::into_inner);
        let epoch = *guard;

        let token = self.storage.get(TOKEN_KEY);
        let user_data = self.storage.get(USER_DATA_KEY);

        let (token, user_data) = match (token, user_data) {
            (Ok(None), Ok(None)) => return Stored::Absent,
            (Ok(Some(token)), Ok(Some(data))) => (token, data),
            (Err(e), _) | (_, Err(e)) => {
                return Stored::Corrupt {
                    epoch,
                    reason: format!("{:#}", e),
                }
            }
            _ => {
                return Stored::Corrupt {
                    epoch,
                    reason: "token and session descriptor not stored together".to_string(),
                }
            }
        };

        let descriptor: SessionDescriptor = match serde_json::from_str(&user_data) {
            Ok(d) => d,
            Err(e) => {
                return Stored::Corrupt {
                    epoch,
                    reason: format!("unreadable session descriptor: {}", e),
                }
            }
        };

        let Some(issued_at) = descriptor.issued_at() else {
            return Stored::Corrupt {
                epoch,
                reason: format!("unparsable login time {:?}", descriptor.login_time),
            };
        };

        if Utc::now() - issued_at >= self.ttl {
            return Stored::Expired { epoch };
        }

        Stored::Live(LiveSession {
            credential: Credential { token, issued_at },
            username: descriptor.username,
            epoch,
        })
    }

    fn commit(&self, username: &str, token: &str, issued_at: DateTime<Utc>) -> Result<(), GateError> {
        let descriptor = serde_json::to_string(&SessionDescriptor::new(username, issued_at))
            .map_err(|e| GateError::Storage(e.to_string()))?;

        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        let stored = self
            .storage
            .set(TOKEN_KEY, token)
            .and_then(|_| self.storage.set(USER_DATA_KEY, &descriptor));

        // Either state changes, so anything derived from the previous session is stale
        *epoch += 1;

        if let Err(e) = stored {
            self.clear_storage();
            warn!(error = ?e, "Failed to persist session");
            return Err(GateError::storage(e));
        }
        Ok(())
    }

    fn clear_storage(&self) {
        for key in [TOKEN_KEY, USER_DATA_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key = key, error = ?e, "Failed to remove session entry");
            }
        }
    }
}
