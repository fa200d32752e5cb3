//! Credential registry.
//!
//! Holds every card id and username the gate knows about. Login
//! credentials carry a SHA-256 password hash; cards do not.
//!
//! # Security
//!
//! Password hashes are compared with `subtle::ConstantTimeEq` and never
//! logged. The built-in seed accounts use well-known passwords and a warning
//! is logged whenever they are loaded.

use metrogate_core::{CredentialId, Error, Result, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Hex-encoded SHA-256 of `password`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// A registered credential.
#[derive(Clone, Serialize)]
pub struct Credential {
    pub id: CredentialId,
    pub display_name: String,
    pub role: Role,
    pub enabled: bool,
    #[serde(skip)]
    password_hash: Option<String>,
}

impl Credential {
    /// Card credential (no password).
    pub fn card(id: CredentialId, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
            enabled: true,
            password_hash: None,
        }
    }

    /// Login credential with a plaintext password, hashed here.
    pub fn login(
        id: CredentialId,
        display_name: impl Into<String>,
        role: Role,
        password: &str,
    ) -> Self {
        Self {
            password_hash: Some(hash_password(password)),
            ..Self::card(id, display_name, role)
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Constant-time password check. Always `false` for cards.
    pub fn verify_password(&self, password: &str) -> bool {
        match &self.password_hash {
            Some(stored) => {
                let candidate = hash_password(password);
                stored.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("role", &self.role)
            .field("enabled", &self.enabled)
            .field("has_password", &self.has_password())
            .finish()
    }
}

/// Credential entry as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSeed {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Plaintext password for login credentials.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

fn default_enabled() -> bool {
    true
}

impl CredentialSeed {
    fn into_credential(self) -> Result<Credential> {
        let id = CredentialId::new(&self.id)?;
        let mut credential = match &self.password {
            Some(password) => Credential::login(id, self.display_name, self.role, password),
            None => Credential::card(id, self.display_name, self.role),
        };
        credential.enabled = self.enabled;
        Ok(credential)
    }
}

const DEFAULT_ACCOUNTS: [(&str, &str, Role, &str); 3] = [
    ("admin", "Administrador", Role::Admin, "admin123"),
    ("usuario1", "Juan Perez", Role::User, "pass123"),
    ("usuario2", "Maria Garcia", Role::User, "pass123"),
];

/// In-memory credential registry.
#[derive(Debug, Default)]
pub struct CredentialRegistry {
    credentials: HashMap<CredentialId, Credential>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in accounts.
    pub fn with_default_accounts() -> Self {
        let mut registry = Self::new();
        for (id, name, role, password) in DEFAULT_ACCOUNTS {
            if let Ok(id) = CredentialId::new(id) {
                registry
                    .credentials
                    .insert(id.clone(), Credential::login(id, name, role, password));
            }
        }
        warn!(
            count = registry.len(),
            "Loaded built-in accounts with default passwords; override them in the configuration"
        );
        registry
    }

    /// Registry from configuration. An empty list falls back to the
    /// built-in accounts.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredentialId` or `Error::DuplicateCredential`
    /// for a bad entry.
    pub fn from_seeds(seeds: Vec<CredentialSeed>) -> Result<Self> {
        if seeds.is_empty() {
            return Ok(Self::with_default_accounts());
        }

        let mut registry = Self::new();
        for seed in seeds {
            if seed.password.as_deref().is_some_and(is_default_password) {
                warn!(id = %seed.id, "Credential configured with a default password");
            }
            registry.add(seed.into_credential()?)?;
        }
        info!(count = registry.len(), "Credential registry loaded");
        Ok(registry)
    }

    /// # Errors
    ///
    /// Returns `Error::DuplicateCredential` if the id is taken.
    pub fn add(&mut self, credential: Credential) -> Result<()> {
        if self.credentials.contains_key(&credential.id) {
            return Err(Error::DuplicateCredential(credential.id.to_string()));
        }
        debug!(id = %credential.id, role = %credential.role, "Credential added");
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    /// Change display name and/or role.
    ///
    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn update(
        &mut self,
        id: &CredentialId,
        display_name: Option<String>,
        role: Option<Role>,
    ) -> Result<Credential> {
        let credential = self.get_mut(id)?;
        if let Some(name) = display_name {
            credential.display_name = name;
        }
        if let Some(role) = role {
            credential.role = role;
        }
        Ok(credential.clone())
    }

    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn set_enabled(&mut self, id: &CredentialId, enabled: bool) -> Result<()> {
        self.get_mut(id)?.enabled = enabled;
        info!(id = %id, enabled, "Credential enabled flag changed");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn remove(&mut self, id: &CredentialId) -> Result<Credential> {
        let credential = self
            .credentials
            .remove(id)
            .ok_or_else(|| Error::CredentialNotFound(id.to_string()))?;
        info!(id = %id, "Credential removed");
        Ok(credential)
    }

    /// Snapshot of one credential.
    pub fn get(&self, id: &CredentialId) -> Option<Credential> {
        self.credentials.get(id).cloned()
    }

    /// All credentials ordered by id.
    pub fn list(&self) -> Vec<Credential> {
        let mut all: Vec<_> = self.credentials.values().cloned().collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        all
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    fn get_mut(&mut self, id: &CredentialId) -> Result<&mut Credential> {
        self.credentials
            .get_mut(id)
            .ok_or_else(|| Error::CredentialNotFound(id.to_string()))
    }
}

fn is_default_password(password: &str) -> bool {
    DEFAULT_ACCOUNTS.iter().any(|(_, _, _, default)| *default == password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> CredentialId {
        CredentialId::new(raw).unwrap()
    }

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("admin123"),
            "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9"
        );
    }

    #[test]
    fn test_default_accounts() {
        let registry = CredentialRegistry::with_default_accounts();
        assert_eq!(registry.len(), 3);

        let admin = registry.get(&id("admin")).unwrap();
        assert_eq!(admin.display_name, "Administrador");
        assert!(admin.role.is_admin());
        assert!(admin.verify_password("admin123"));
        assert!(!admin.verify_password("admin124"));

        let user = registry.get(&id("usuario1")).unwrap();
        assert_eq!(user.display_name, "Juan Perez");
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_card_never_verifies_password() {
        let card = Credential::card(id("card-42"), "Card 42", Role::User);
        assert!(!card.has_password());
        assert!(!card.verify_password(""));
    }

    #[test]
    fn test_crud() {
        let mut registry = CredentialRegistry::new();
        registry
            .add(Credential::card(id("card-42"), "Card 42", Role::User))
            .unwrap();

        assert!(matches!(
            registry.add(Credential::card(id("card-42"), "Other", Role::User)),
            Err(Error::DuplicateCredential(_))
        ));

        let updated = registry
            .update(&id("card-42"), Some("Ana".to_string()), Some(Role::Admin))
            .unwrap();
        assert_eq!(updated.display_name, "Ana");
        assert_eq!(updated.role, Role::Admin);

        registry.set_enabled(&id("card-42"), false).unwrap();
        assert!(!registry.get(&id("card-42")).unwrap().enabled);

        registry.remove(&id("card-42")).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.remove(&id("card-42")),
            Err(Error::CredentialNotFound(_))
        ));
    }

    #[test]
    fn test_list_sorted() {
        let registry = CredentialRegistry::with_default_accounts();
        let ids: Vec<_> = registry
            .list()
            .into_iter()
            .map(|c| c.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["admin", "usuario1", "usuario2"]);
    }

    #[test]
    fn test_from_seeds() {
        let registry = CredentialRegistry::from_seeds(vec![
            CredentialSeed {
                id: "card-42".to_string(),
                display_name: "Card 42".to_string(),
                role: Role::User,
                enabled: true,
                password: None,
            },
            CredentialSeed {
                id: "card-7".to_string(),
                display_name: "Card 7".to_string(),
                role: Role::User,
                enabled: false,
                password: None,
            },
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(!registry.get(&id("card-7")).unwrap().enabled);
        assert!(CredentialRegistry::from_seeds(Vec::new()).unwrap().len() == 3);
    }

    #[test]
    fn test_debug_hides_hash() {
        let credential = Credential::login(id("admin"), "Admin", Role::Admin, "secret");
        let debug = format!("{credential:?}");
        assert!(!debug.contains(&hash_password("secret")));
        assert!(debug.contains("has_password: true"));
    }
}
