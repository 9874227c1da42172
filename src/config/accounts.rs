//! Simulated user accounts
//!
//! One credential pair per session. The number of configured accounts is the
//! number of sessions the harness runs in parallel.

use std::fmt;

/// Login credentials for one simulated user
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Parse `user:password` pairs separated by commas.
///
/// The password is everything after the first colon, so it may itself
/// contain colons. Blank entries are skipped.
pub fn parse_credentials(s: &str) -> Result<Vec<Credential>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, password) = entry
                .split_once(':')
                .ok_or_else(|| format!("Credential entry '{entry}' must be user:password"))?;
            if username.is_empty() {
                return Err(format!("Credential entry '{entry}' has an empty username"));
            }
            Ok(Credential::new(username, password))
        })
        .collect()
}
