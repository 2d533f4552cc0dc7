use std::sync::{Arc, PoisonError, RwLock};

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, GateError, Transport};
use crate::auth::SessionStore;

use super::permissions::{Feature, Permission, PermissionSnapshot, PermissionState};

const PERMISSIONS_PATH: &str = "/api/auth/permissions";
const CHECK_PERMISSION_PATH: &str = "/api/auth/check-permission";

/// A snapshot tagged with the session epoch it was loaded under.
struct LoadedPermissions {
    epoch: u64,
    snapshot: Arc<PermissionSnapshot>,
}

#[derive(Debug, Deserialize)]
struct CheckPermissionResponse {
    #[serde(rename = "hasPermission")]
    has_permission: bool,
}

/// Gates actions behind named permissions and tears the session down when
/// the server rejects its credential.
pub struct AccessGate {
    session: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    permissions: RwLock<Option<LoadedPermissions>>,
}

impl AccessGate {
    pub fn new(session: Arc<SessionStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            permissions: RwLock::new(None),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Fetch the permission snapshot for the live session and swap it in.
    ///
    /// On failure the previously loaded snapshot stays in place. A snapshot
    /// that arrives after its session ended is dropped and `SessionInvalid`
    /// is returned.
    pub async fn load_permissions(&self) -> Result<Arc<PermissionSnapshot>, GateError> {
        let (response, epoch) = self
            .send_authenticated(ApiRequest::get(PERMISSIONS_PATH))
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to load permissions");
                e
            })?;

        let snapshot: PermissionSnapshot = response.error_for_status()?.json()?;
        let snapshot = Arc::new(snapshot);

        let mut slot = self
            .permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.session.epoch() != epoch {
            debug!("Ignoring permissions for a session that has ended");
            return Err(GateError::SessionInvalid);
        }
        *slot = Some(LoadedPermissions {
            epoch,
            snapshot: Arc::clone(&snapshot),
        });
        drop(slot);

        info!(
            username = snapshot.username.as_deref().unwrap_or("-"),
            count = snapshot.permissions.len(),
            "Permissions loaded"
        );
        Ok(snapshot)
    }

    /// Deny-by-default membership check against the live session's snapshot.
    pub fn has_permission(&self, permission: impl AsRef<str>) -> bool {
        let permission = permission.as_ref();
        let Some(live) = self.session.live_session() else {
            debug!(permission = permission, "No live session");
            return false;
        };
        match self.loaded_for(live.epoch) {
            Some(snapshot) => snapshot.permissions.contains(permission),
            None => {
                warn!(permission = permission, "Permissions not loaded yet");
                false
            }
        }
    }

    /// `NotLoaded` until a snapshot exists for the live session.
    pub fn permission_state(&self) -> PermissionState {
        match self.current() {
            Some(snapshot) => PermissionState::Loaded(snapshot),
            None => PermissionState::NotLoaded,
        }
    }

    pub fn require_permission(&self, permission: impl AsRef<str>) -> Result<(), GateError> {
        let permission = permission.as_ref();
        if self.has_permission(permission) {
            Ok(())
        } else {
            warn!(permission = permission, "Access denied");
            Err(GateError::permission_denied(permission))
        }
    }

    /// Run `action` only if the permission is held; otherwise hand a
    /// `PermissionDenied` naming it to `on_denied`.
    ///
    /// An action that makes further calls returns its future for the caller
    /// to await.
    pub fn check_permission<T>(
        &self,
        permission: impl AsRef<str>,
        action: impl FnOnce() -> T,
        on_denied: impl FnOnce(GateError),
    ) -> Option<T> {
        match self.require_permission(permission) {
            Ok(()) => Some(action()),
            Err(denied) => {
                on_denied(denied);
                None
            }
        }
    }

    /// Like `check_permission`, with a caller-supplied denial message.
    pub fn check_permission_with_message<T>(
        &self,
        permission: impl AsRef<str>,
        message: impl Into<String>,
        action: impl FnOnce() -> T,
        on_denied: impl FnOnce(GateError),
    ) -> Option<T> {
        let permission = permission.as_ref();
        self.check_permission(permission, action, |_| {
            on_denied(GateError::PermissionDenied {
                permission: permission.to_string(),
                message: message.into(),
            })
        })
    }

    /// Send a request with the session's bearer token attached.
    ///
    /// `401` tears the session down and yields `SessionExpired`. Every other
    /// status is returned untouched; see `ApiResponse::error_for_status`.
    pub async fn authenticated_call(&self, request: ApiRequest) -> Result<ApiResponse, GateError> {
        self.send_authenticated(request)
            .await
            .map(|(response, _)| response)
    }

    /// Ask the backend whether the current user holds `permission`.
    pub async fn check_remote_permission(
        &self,
        permission: impl AsRef<str>,
    ) -> Result<bool, GateError> {
        let path = format!("{}/{}", CHECK_PERMISSION_PATH, permission.as_ref());
        let response = self
            .authenticated_call(ApiRequest::get(path))
            .await?
            .error_for_status()?;
        Ok(response.json::<CheckPermissionResponse>()?.has_permission)
    }

    /// Load permissions for a freshly opened session. Returns whether it worked.
    pub async fn initialize(&self) -> bool {
        info!("Initializing authorization");
        match self.load_permissions().await {
            Ok(_) => {
                let hidden = self.hidden_features();
                debug!(hidden = ?hidden, "Features hidden by missing permissions");
                info!("Authorization initialized");
                true
            }
            Err(e) => {
                warn!(error = %e, "Authorization initialization failed");
                false
            }
        }
    }

    /// Features whose required permission is missing
    pub fn hidden_features(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| !self.has_permission(feature.required_permission()))
            .collect()
    }

    pub fn can_manage_roles(&self) -> bool {
        self.has_permission(Permission::ManageRoles)
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_permission(Permission::ManageUsers)
    }

    pub fn can_upload_documents(&self) -> bool {
        self.has_permission(Permission::UploadDocument)
    }

    pub fn can_view_documents(&self) -> bool {
        self.has_permission(Permission::ViewDocument)
    }

    pub fn can_download_documents(&self) -> bool {
        self.has_permission(Permission::DownloadDocument)
    }

    pub fn can_delete_documents(&self) -> bool {
        self.has_permission(Permission::DeleteDocument)
    }

    /// End the session and forget its permissions.
    pub fn logout(&self) {
        self.session.teardown();
        self.discard_stale();
        info!("Logged out");
    }

    async fn send_authenticated(
        &self,
        request: ApiRequest,
    ) -> Result<(ApiResponse, u64), GateError> {
        let Some(live) = self.session.live_session() else {
            debug!(path = %request.path, "Refusing call without a live session");
            return Err(GateError::SessionInvalid);
        };

        let path = request.path.clone();
        let response = self
            .transport
            .send(request.with_bearer(live.credential.token))
            .await?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!(path = %path, "Credential rejected by server");
            if self.session.teardown_if_epoch(live.epoch) {
                self.discard_stale();
            }
            return Err(GateError::SessionExpired);
        }

        Ok((response, live.epoch))
    }

    fn current(&self) -> Option<Arc<PermissionSnapshot>> {
        let epoch = self.session.live_session()?.epoch;
        self.loaded_for(epoch)
    }

    /// The snapshot loaded under `epoch`, if that is what the slot holds.
    fn loaded_for(&self, epoch: u64) -> Option<Arc<PermissionSnapshot>> {
        let slot = self
            .permissions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|loaded| loaded.epoch == epoch)
            .map(|loaded| Arc::clone(&loaded.snapshot))
    }

    /// Drop a snapshot that belongs to an earlier session.
    fn discard_stale(&self) {
        let epoch = self.session.epoch();
        let mut slot = self
            .permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|loaded| loaded.epoch != epoch) {
            *slot = None;
        }
    }
}
