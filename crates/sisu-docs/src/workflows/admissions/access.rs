//! Staff roles expressed as explicit permission sets.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::domain::{SecretariatId, StaffUserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageSystem,
    ManageCandidates,
    ValidateDocuments,
    ViewReports,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::ManageSystem,
        Permission::ManageCandidates,
        Permission::ValidateDocuments,
        Permission::ViewReports,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::ManageSystem => 1,
            Self::ManageCandidates => 1 << 1,
            Self::ValidateDocuments => 1 << 2,
            Self::ViewReports => 1 << 3,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ManageSystem => "manage_system",
            Self::ManageCandidates => "manage_candidates",
            Self::ValidateDocuments => "validate_documents",
            Self::ViewReports => "view_reports",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    pub fn contains(self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn require(self, permission: Permission) -> Result<(), AccessError> {
        if self.contains(permission) {
            Ok(())
        } else {
            Err(AccessError::Denied(permission))
        }
    }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL
            .into_iter()
            .filter(move |permission| self.contains(*permission))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, permission| set.with(permission))
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let permissions = Vec::<Permission>::deserialize(deserializer)?;
        Ok(permissions.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Administrator,
    Coordinator,
    Secretary,
}

impl StaffRole {
    pub fn permissions(self) -> PermissionSet {
        let base = PermissionSet::empty().with(Permission::ValidateDocuments);
        match self {
            Self::Administrator => base
                .with(Permission::ManageSystem)
                .with(Permission::ManageCandidates)
                .with(Permission::ViewReports),
            Self::Coordinator => base
                .with(Permission::ManageCandidates)
                .with(Permission::ViewReports),
            Self::Secretary => base,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Administrator => "administrador",
            Self::Coordinator => "coordenador",
            Self::Secretary => "secretario",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "administrador" | "administrator" => Some(Self::Administrator),
            "coordenador" | "coordinator" => Some(Self::Coordinator),
            "secretario" | "secretary" => Some(Self::Secretary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffUser {
    pub id: StaffUserId,
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    /// Secretaries only see candidates of this secretariat's course.
    pub secretariat_id: Option<SecretariatId>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StaffUser {
    pub fn context(&self) -> StaffContext {
        StaffContext {
            user_id: self.id,
            permissions: self.role.permissions(),
            secretariat_id: self.secretariat_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaffUser {
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    #[serde(default)]
    pub secretariat_id: Option<SecretariatId>,
    pub password: String,
}

/// Authenticated staff member as seen by services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffContext {
    pub user_id: StaffUserId,
    pub permissions: PermissionSet,
    pub secretariat_id: Option<SecretariatId>,
}

impl StaffContext {
    pub fn require(&self, permission: Permission) -> Result<(), AccessError> {
        self.permissions.require(permission)
    }

    /// Staff without candidate management rights are limited to one secretariat.
    pub fn is_scoped(&self) -> bool {
        !self.permissions.contains(Permission::ManageCandidates)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("missing permission: {0}")]
    Denied(Permission),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

pub fn hash_password(password: &str) -> Result<String, AccessError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AccessError::PasswordHash(err.to_string()))
}

pub fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_expected_permissions() {
        let admin = StaffRole::Administrator.permissions();
        assert!(Permission::ALL.iter().all(|p| admin.contains(*p)));

        let coordinator = StaffRole::Coordinator.permissions();
        assert!(!coordinator.contains(Permission::ManageSystem));
        assert!(coordinator.contains(Permission::ManageCandidates));

        let secretary = StaffRole::Secretary.permissions();
        assert_eq!(secretary.iter().collect::<Vec<_>>(), vec![Permission::ValidateDocuments]);
    }

    #[test]
    fn require_reports_missing_permission() {
        let secretary = StaffRole::Secretary.permissions();
        match secretary.require(Permission::ManageSystem) {
            Err(AccessError::Denied(Permission::ManageSystem)) => {}
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn permission_set_serializes_as_list() {
        let set = StaffRole::Coordinator.permissions();
        let json = serde_json::to_value(set).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!(["manage_candidates", "validate_documents", "view_reports"])
        );
        let back: PermissionSet = serde_json::from_value(json).expect("deserializes");
        assert_eq!(back, set);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret-pass").expect("hashes");
        assert!(verify_password(&hash, "s3cret-pass"));
        assert!(!verify_password(&hash, "wrong"));
        assert!(!verify_password("not-a-hash", "s3cret-pass"));
    }
}
