//! In-process adapters for the collaborator ports.
//!
//! Useful for tests and local development. Nothing here survives a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use validator::{ValidationError, ValidationErrors};

use crate::crypto::{Hasher, PasswordManager};
use crate::error::{Error, Result};
use crate::mail::Mailer;
use crate::session::SessionStore;
use crate::user::{
    Account, CredentialStore, Fingerprint, UserId, normalize_email,
};

struct Record {
    email: String,
    password_hash: String,
    locked: bool,
}

/// Credential store keeping Argon2id hashes in memory.
///
/// Fingerprints are a peppered SHA-256 of the PHC string, so the hash
/// itself never ends up inside a token.
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<UserId, Record>>,
    passwords: PasswordManager,
    hasher: Hasher,
}

impl MemoryCredentialStore {
    /// Create a new [`MemoryCredentialStore`].
    pub fn new(passwords: PasswordManager, pepper: impl AsRef<[u8]>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            passwords,
            hasher: Hasher::new(pepper),
        }
    }

    fn account(&self, id: &UserId, record: &Record) -> Account {
        Account {
            id: id.clone(),
            email: record.email.clone(),
            fingerprint: Fingerprint::new(
                self.hasher.digest(&record.password_hash),
            ),
            locked: record.locked,
        }
    }

    /// Register a user.
    pub fn insert(
        &self,
        id: impl Into<UserId>,
        email: &str,
        password: &str,
    ) -> Result<Account> {
        let id = id.into();
        let record = Record {
            email: normalize_email(email),
            password_hash: self.passwords.hash_password(password)?,
            locked: false,
        };
        let account = self.account(&id, &record);

        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, record);

        Ok(account)
    }

    /// Block or unblock sign-in for a user.
    pub fn set_locked(&self, id: &UserId, locked: bool) {
        if let Some(record) = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            record.locked = locked;
        }
    }

    /// Check an email and password pair.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<Account> {
        let email = normalize_email(email);
        let records =
            self.records.read().unwrap_or_else(PoisonError::into_inner);

        records
            .iter()
            .find(|(_, record)| record.email == email)
            .filter(|(_, record)| {
                self.passwords
                    .verify_password(password, &record.password_hash)
            })
            .map(|(id, record)| self.account(id, record))
    }
}

fn blank_password() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "password",
        ValidationError::new("blank")
            .with_message("Password can't be blank.".into()),
    );
    errors
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_normalized_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>> {
        let records =
            self.records.read().unwrap_or_else(PoisonError::into_inner);

        Ok(records
            .iter()
            .find(|(_, record)| record.email == email)
            .map(|(id, record)| self.account(id, record)))
    }

    async fn find_by_id_and_fingerprint(
        &self,
        id: &UserId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Account>> {
        let records =
            self.records.read().unwrap_or_else(PoisonError::into_inner);

        Ok(records
            .get(id)
            .map(|record| self.account(id, record))
            .filter(|account| &account.fingerprint == fingerprint))
    }

    async fn update_password(
        &self,
        id: &UserId,
        password: &str,
    ) -> Result<Account> {
        if password.trim().is_empty() {
            return Err(Error::Validation(blank_password()));
        }

        let password_hash = self.passwords.hash_password(password)?;
        let mut records =
            self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records.get_mut(id).ok_or_else(|| Error::Internal {
            details: format!("user {id} vanished during password update"),
            source: None,
        })?;
        record.password_hash = password_hash;

        Ok(self.account(id, record))
    }
}

/// Reset link handed to a [`MemoryMailer`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub account: Account,
    pub token: String,
}

/// Mailer pushing every delivery into a channel.
pub struct MemoryMailer {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl MemoryMailer {
    /// Create a new [`MemoryMailer`] and the receiving end of its outbox.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn deliver_password_reset(
        &self,
        account: &Account,
        token: &str,
    ) -> Result<()> {
        self.sender
            .send(Delivery {
                account: account.clone(),
                token: token.to_owned(),
            })
            .map_err(|err| Error::internal("outbox is closed", err))
    }
}

/// Records which users hold a session.
#[derive(Default)]
pub struct MemorySessions {
    signed_in: Mutex<HashSet<UserId>>,
}

impl MemorySessions {
    pub fn is_signed_in(&self, id: &UserId) -> bool {
        self.signed_in
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn establish(&self, account: &Account) -> Result<()> {
        self.signed_in
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.id.clone());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_store() -> MemoryCredentialStore {
    let params = argon2::Params::new(1024, 1, 1, None).unwrap();
    MemoryCredentialStore::new(PasswordManager::new(params), b"pepper")
}
