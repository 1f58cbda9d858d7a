use super::Identifiable;
use crate::security::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub hashed_password: String,
    pub salt: String,
    pub role: Role,
}

impl Identifiable for UserRecord {
    const KIND: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }

    /// Usernames are unique across accounts.
    fn unique_key(&self) -> &str {
        &self.username
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmProvider {
    Aws,
    Gcp,
}

impl VmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            VmProvider::Aws => "AWS",
            VmProvider::Gcp => "GCP",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AWS" => Some(VmProvider::Aws),
            "GCP" => Some(VmProvider::Gcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmStatus {
    Initializing,
    Up,
    Down,
}

impl VmStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VmStatus::Initializing => "INITIALIZING",
            VmStatus::Up => "UP",
            VmStatus::Down => "DOWN",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INITIALIZING" => Some(VmStatus::Initializing),
            "UP" => Some(VmStatus::Up),
            "DOWN" => Some(VmStatus::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: String,
    pub provider: VmProvider,
    pub status: VmStatus,
    pub owner_id: String,
}

impl VmRecord {
    pub fn with_status(&self, status: VmStatus) -> Self {
        VmRecord {
            status,
            ..self.clone()
        }
    }
}

impl Identifiable for VmRecord {
    const KIND: &'static str = "vm";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_serializes_with_uppercase_enums() {
        let vm = VmRecord {
            id: "VM:1".to_string(),
            provider: VmProvider::Gcp,
            status: VmStatus::Initializing,
            owner_id: "USER:1".to_string(),
        };
        let json = serde_json::to_value(&vm).unwrap();
        assert_eq!(json["provider"], "GCP");
        assert_eq!(json["status"], "INITIALIZING");
        assert_eq!(json["owner_id"], "USER:1");
    }

    #[test]
    fn provider_parsing_ignores_case() {
        assert_eq!(VmProvider::from_str("aws"), Some(VmProvider::Aws));
        assert_eq!(VmProvider::from_str("GCP"), Some(VmProvider::Gcp));
        assert_eq!(VmProvider::from_str("azure"), None);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [VmStatus::Initializing, VmStatus::Up, VmStatus::Down] {
            assert_eq!(VmStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(VmStatus::from_str("up"), None);
    }

    #[test]
    fn unique_key_of_user_is_username() {
        let user = UserRecord {
            id: "USER:1".to_string(),
            username: "alice".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            hashed_password: String::new(),
            salt: String::new(),
            role: Role::User,
        };
        assert_eq!(user.unique_key(), "alice");
        assert_eq!(Identifiable::id(&user), "USER:1");
    }
}
