use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Permission names the document-management backend grants.
///
/// Any string is accepted wherever a permission name is taken; these are
/// just the ones the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ManageRoles,
    ManageUsers,
    UploadDocument,
    ViewDocument,
    DownloadDocument,
    DeleteDocument,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ManageRoles,
        Permission::ManageUsers,
        Permission::UploadDocument,
        Permission::ViewDocument,
        Permission::DownloadDocument,
        Permission::DeleteDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageRoles => "MANAGE_ROLES",
            Permission::ManageUsers => "MANAGE_USERS",
            Permission::UploadDocument => "UPLOAD_DOCUMENT",
            Permission::ViewDocument => "VIEW_DOCUMENT",
            Permission::DownloadDocument => "DOWNLOAD_DOCUMENT",
            Permission::DeleteDocument => "DELETE_DOCUMENT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission names granted to a session. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Payload of `GET /api/auth/permissions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    #[serde(default)]
    pub username: Option<String>,
    pub permissions: PermissionSet,
    /// Every other field the server sent (`canManageRoles`, ...)
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PermissionSnapshot {
    pub fn new(permissions: PermissionSet) -> Self {
        Self {
            username: None,
            permissions,
            metadata: serde_json::Map::new(),
        }
    }

    /// Boolean metadata field, e.g. `flag("canManageRoles")`
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.metadata.get(name).and_then(serde_json::Value::as_bool)
    }
}

/// Whether permissions have been loaded for the live session.
///
/// `Loaded` with an empty set means "known, zero grants"; `NotLoaded` means
/// "unknown". Both deny every permission.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionState {
    NotLoaded,
    Loaded(Arc<PermissionSnapshot>),
}

impl PermissionState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, PermissionState::Loaded(_))
    }

    pub fn snapshot(&self) -> Option<&PermissionSnapshot> {
        match self {
            PermissionState::Loaded(snapshot) => Some(snapshot),
            PermissionState::NotLoaded => None,
        }
    }
}

/// UI areas that are hidden when their permission is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Feature {
    RoleManagement,
    UserManagement,
    DocumentUpload,
}

impl Feature {
    pub const ALL: [Feature; 3] = [
        Feature::RoleManagement,
        Feature::UserManagement,
        Feature::DocumentUpload,
    ];

    pub fn required_permission(&self) -> Permission {
        match self {
            Feature::RoleManagement => Permission::ManageRoles,
            Feature::UserManagement => Permission::ManageUsers,
            Feature::DocumentUpload => Permission::UploadDocument,
        }
    }

    /// Element ids (or `data-permission` values) of the controls behind this feature
    pub fn element_ids(&self) -> &'static [&'static str] {
        match self {
            Feature::RoleManagement => &["gestion_roles_link", "roles_menu_item"],
            Feature::UserManagement => &["gestion_usuarios_link", "users_menu_item"],
            Feature::DocumentUpload => &["upload_document_btn", "subir_menu_item"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permissions_response() {
        let json = r#"{"username":"admin","permissions":["VIEW_DOCUMENT","MANAGE_ROLES"],"canManageRoles":true,"canManageUsers":false,"canUploadDocuments":false}"#;

        let snapshot: PermissionSnapshot =
            serde_json::from_str(json).expect("Failed to parse permissions test JSON");
        assert_eq!(snapshot.username.as_deref(), Some("admin"));
        assert_eq!(snapshot.permissions.len(), 2);
        assert!(snapshot.permissions.contains("VIEW_DOCUMENT"));
        assert!(!snapshot.permissions.contains("DELETE_DOCUMENT"));

        // Remaining fields are kept as metadata
        assert_eq!(snapshot.flag("canManageRoles"), Some(true));
        assert_eq!(snapshot.flag("canManageUsers"), Some(false));
        assert_eq!(snapshot.flag("missing"), None);
        assert!(!snapshot.metadata.contains_key("permissions"));
    }

    #[test]
    fn test_parse_permissions_requires_list() {
        let result = serde_json::from_str::<PermissionSnapshot>(r#"{"username":"admin"}"#);
        assert!(result.is_err());

        let empty: PermissionSnapshot = serde_json::from_str(r#"{"permissions":[]}"#).unwrap();
        assert!(empty.permissions.is_empty());
        assert_eq!(empty.username, None);
    }

    #[test]
    fn test_permission_names() {
        for permission in Permission::ALL {
            assert_eq!(Permission::from_name(permission.as_str()), Some(permission));
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission));
        }
        assert_eq!(Permission::from_name("manage_roles"), None);
    }

    #[test]
    fn test_feature_permissions() {
        assert_eq!(
            Feature::RoleManagement.required_permission(),
            Permission::ManageRoles
        );
        assert_eq!(
            Feature::UserManagement.required_permission(),
            Permission::ManageUsers
        );
        assert_eq!(
            Feature::DocumentUpload.required_permission(),
            Permission::UploadDocument
        );
        assert!(Feature::ALL.iter().all(|f| f.element_ids().len() == 2));
    }

    #[test]
    fn test_permission_set_from_iter() {
        let set: PermissionSet = ["B", "A", "A"].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_permission_state() {
        assert!(!PermissionState::NotLoaded.is_loaded());
        let loaded = PermissionState::Loaded(Arc::new(PermissionSnapshot::new(
            PermissionSet::default(),
        )));
        assert!(loaded.is_loaded());
        assert!(loaded.snapshot().unwrap().permissions.is_empty());
    }
}
