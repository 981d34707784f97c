//! Login bookkeeping for the replay server
//!
//! Every name that logs in successfully is registered together with a secret.
//! The secret is handed back to the client, which can present it later to
//! reclaim the same name. Registrations outlive the connection that created
//! them, so a viewer that drops out can come back under its old name.

use log::info;
use shared::{ConnectionKind, Login};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Why a login was turned down. The display text is sent to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("Replay server only accepts viewers!")]
    NotAViewer,

    #[error("Invalid login!")]
    InvalidSecret,

    #[error("Server full!")]
    Full,

    #[error("Name already in use!")]
    NameTaken,
}

/// A registered viewer
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub secret: Uuid,
    /// How many times the name has logged in, the first time included
    pub logins: u32,
}

/// Registered viewers indexed by name
pub struct Registry {
    viewers: HashMap<String, Registration>,
    max_viewers: usize,
}

impl Registry {
    /// Creates an empty registry that accepts at most `max_viewers` names
    pub fn new(max_viewers: usize) -> Self {
        Self {
            viewers: HashMap::new(),
            max_viewers,
        }
    }

    /// Checks a login request and returns the secret to reply with
    ///
    /// A request carrying a secret must match the registration for its name.
    /// A request without one registers the name with a fresh secret, as long
    /// as there is room and nobody holds the name yet.
    pub fn login(&mut self, login: &Login) -> Result<Uuid, LoginError> {
        if login.kind != ConnectionKind::Viewer {
            return Err(LoginError::NotAViewer);
        }

        if let Some(secret) = login.secret {
            let registration = self
                .viewers
                .get_mut(&login.name)
                .filter(|registration| registration.secret == secret)
                .ok_or(LoginError::InvalidSecret)?;
            registration.logins += 1;
            info!("Viewer {} logged in again", login.name);
            return Ok(secret);
        }

        if self.viewers.len() >= self.max_viewers {
            return Err(LoginError::Full);
        }
        if self.viewers.contains_key(&login.name) {
            return Err(LoginError::NameTaken);
        }

        let secret = Uuid::new_v4();
        self.viewers.insert(
            login.name.clone(),
            Registration {
                name: login.name.clone(),
                secret,
                logins: 1,
            },
        );
        info!("Viewer {} registered", login.name);
        Ok(secret)
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.viewers.get(name)
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn max_viewers(&self) -> usize {
        self.max_viewers
    }
}
