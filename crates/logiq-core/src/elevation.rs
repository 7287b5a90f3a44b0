//! Classification of the elevation probe output.
//!
//! The probe asks `sudo` for the effective identity with stdin closed, so a
//! host that needs a password prints its prompt and gives up instead of
//! waiting for input.

use serde::{Deserialize, Serialize};

/// Prompt text we ask sudo to print, so the marker is predictable.
pub const PROMPT_MARKER: &str = "[sudo] password for";

/// Probe command reporting the elevated identity.
pub const ELEVATION_PROBE: &str =
    "sudo -S -p '[sudo] password for %u: ' id 2>&1 < /dev/null";

const SUCCESS_MARKER: &str = "uid=0(";

/// Case-insensitive markers meaning elevation is impossible for this user.
const DENIAL_MARKERS: &[&str] = &[
    "is not in the sudoers file",
    "is not allowed to run sudo",
    "may not run sudo",
    "sudo: command not found",
    "sudo: not found",
    "no such file or directory",
    "permission denied",
    "account validation failure",
];

/// Case-insensitive prompt signatures, including our own [`PROMPT_MARKER`].
const PROMPT_MARKERS: &[&str] = &["password for", "sudo password:", "password:"];

/// Markers printed when a supplied secret was rejected.
const REJECTION_MARKERS: &[&str] = &[
    "sorry, try again",
    "incorrect password",
    "no password was provided",
    "a password is required",
];

/// Three-way elevation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Elevation {
    /// Elevated identity reached without a prompt.
    Passwordless,
    /// Elevation possible once the admin secret is supplied.
    RequiresSecret,
    /// No usable elevation mechanism.
    Unavailable { reason: String },
}

/// Elevation status plus the raw probe output it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevationResult {
    pub elevation: Elevation,
    pub raw_output: String,
}

impl ElevationResult {
    /// Classify the combined output of [`ELEVATION_PROBE`].
    ///
    /// A root identity wins over any warning printed alongside it; denials
    /// win over prompts. Output with neither the root identity nor a prompt
    /// is treated as unavailable.
    pub fn classify(output: &str) -> Self {
        let lower = output.to_lowercase();

        let elevation = if output.contains(SUCCESS_MARKER) {
            Elevation::Passwordless
        } else if let Some(marker) = DENIAL_MARKERS.iter().find(|m| lower.contains(*m)) {
            Elevation::Unavailable {
                reason: format!("elevation refused ({marker})"),
            }
        } else if has_prompt(&lower) {
            Elevation::RequiresSecret
        } else {
            Elevation::Unavailable {
                reason: "no elevated identity and no password prompt in probe output".into(),
            }
        };

        Self {
            elevation,
            raw_output: output.to_string(),
        }
    }

    pub fn unavailable(reason: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            elevation: Elevation::Unavailable {
                reason: reason.into(),
            },
            raw_output: raw_output.into(),
        }
    }

    pub fn available(&self) -> bool {
        !matches!(self.elevation, Elevation::Unavailable { .. })
    }

    pub fn requires_secret(&self) -> bool {
        matches!(self.elevation, Elevation::RequiresSecret)
    }
}

fn has_prompt(lower: &str) -> bool {
    PROMPT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether sudo output shows that a supplied secret was rejected.
pub fn secret_rejected(output: &str) -> bool {
    let lower = output.to_lowercase();
    REJECTION_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_identity_is_passwordless() {
        let result = ElevationResult::classify("uid=0(root) gid=0(root)");
        assert_eq!(result.elevation, Elevation::Passwordless);
        assert!(result.available());
        assert!(!result.requires_secret());
    }

    #[test]
    fn root_identity_beats_sudo_warnings() {
        for output in [
            "sudo: unable to resolve host box: No such file or directory\nuid=0(root) gid=0(root)",
            "sudo: /etc/sudoers.d/x: Permission denied\nuid=0(root) gid=0(root)",
        ] {
            let result = ElevationResult::classify(output);
            assert_eq!(result.elevation, Elevation::Passwordless, "{output}");
        }
    }

    #[test]
    fn sudo_prompt_requires_secret() {
        let result = ElevationResult::classify("[sudo] password for admin:");
        assert!(result.available());
        assert!(result.requires_secret());
        assert_eq!(result.raw_output, "[sudo] password for admin:");
    }

    #[test]
    fn alternative_prompt_spellings() {
        for output in ["Password for admin:", "sudo password:", "Password:"] {
            assert!(
                ElevationResult::classify(output).requires_secret(),
                "{output}"
            );
        }
    }

    #[test]
    fn prompt_followed_by_missing_password_still_requires_secret() {
        let output = "[sudo] password for admin: sudo: no password was provided";
        assert!(ElevationResult::classify(output).requires_secret());
    }

    #[test]
    fn denials_are_unavailable() {
        for output in [
            "sudo: command not found",
            "Permission denied",
            "admin is not in the sudoers file.  This incident will be reported.",
            "Sorry, user admin may not run sudo on host.",
        ] {
            let result = ElevationResult::classify(output);
            assert!(!result.available(), "{output}");
            assert!(!result.requires_secret(), "{output}");
        }
    }

    #[test]
    fn ambiguous_output_fails_closed() {
        for output in ["", "uid=1000(admin) gid=1000(admin)", "sudo: unable to resolve host"] {
            let result = ElevationResult::classify(output);
            assert!(
                matches!(result.elevation, Elevation::Unavailable { .. }),
                "{output}"
            );
        }
    }

    #[test]
    fn rejection_markers() {
        assert!(secret_rejected("Sorry, try again."));
        assert!(secret_rejected("sudo: 3 incorrect password attempts"));
        assert!(!secret_rejected("0"));
    }
}
