//! Secret handles and the secret-retrieval interface.

use std::fmt;

use logiq_core::LogiqResult;

use crate::transport::ConnectTarget;

/// A password or passphrase. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The secret followed by a newline, as `sudo -S` reads it.
    pub(crate) fn as_stdin_line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(self.0.len() + 1);
        line.extend_from_slice(self.0.as_bytes());
        line.push(b'\n');
        line
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Supplies credentials for a connection attempt.
pub trait SecretSource: Send + Sync {
    /// The SSH login secret.
    fn ssh_secret(&self, target: &ConnectTarget) -> LogiqResult<Secret>;

    /// The elevation secret, when it differs from the login secret.
    fn admin_secret(&self, _target: &ConnectTarget) -> LogiqResult<Option<Secret>> {
        Ok(None)
    }
}

/// Fixed credentials known up front.
#[derive(Debug, Clone)]
pub struct StaticSecret {
    password: Secret,
    admin: Option<Secret>,
}

impl StaticSecret {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Secret::new(password),
            admin: None,
        }
    }

    pub fn with_admin(mut self, admin: impl Into<String>) -> Self {
        self.admin = Some(Secret::new(admin));
        self
    }
}

impl SecretSource for StaticSecret {
    fn ssh_secret(&self, _target: &ConnectTarget) -> LogiqResult<Secret> {
        Ok(self.password.clone())
    }

    fn admin_secret(&self, _target: &ConnectTarget) -> LogiqResult<Option<Secret>> {
        Ok(self.admin.clone())
    }
}

/// The admin secret for `target`, falling back to the login secret.
pub fn resolve_admin_secret(
    source: &dyn SecretSource,
    target: &ConnectTarget,
    login: &Secret,
) -> LogiqResult<Secret> {
    Ok(source
        .admin_secret(target)?
        .unwrap_or_else(|| login.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectTarget {
        ConnectTarget::new("admin", "host", 22)
    }

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
        let source = StaticSecret::new("hunter2");
        assert!(!format!("{source:?}").contains("hunter2"));
    }

    #[test]
    fn admin_defaults_to_login_secret() {
        let source = StaticSecret::new("login");
        let login = source.ssh_secret(&target()).unwrap();
        let admin = resolve_admin_secret(&source, &target(), &login).unwrap();
        assert_eq!(admin.expose(), "login");

        let source = StaticSecret::new("login").with_admin("root-pw");
        let admin = resolve_admin_secret(&source, &target(), &login).unwrap();
        assert_eq!(admin.expose(), "root-pw");
    }

    #[test]
    fn stdin_line_ends_with_newline() {
        assert_eq!(Secret::new("pw").as_stdin_line(), b"pw\n".to_vec());
    }
}
