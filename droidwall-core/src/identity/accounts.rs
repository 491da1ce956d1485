use crate::rules::OwnerId;

/// Resolves well-known system account names to ids.
pub trait SystemAccounts: Send + Sync {
    fn uid_for_name(&self, name: &str) -> Option<OwnerId>;
}

/// Looks accounts up in the system user database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixAccounts;

impl SystemAccounts for NixAccounts {
    #[cfg(unix)]
    fn uid_for_name(&self, name: &str) -> Option<OwnerId> {
        match nix::unistd::User::from_name(name) {
            Ok(Some(user)) => Some(OwnerId::from(user.uid.as_raw())),
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(name, error = %err, "account lookup failed");
                None
            }
        }
    }

    #[cfg(not(unix))]
    fn uid_for_name(&self, _name: &str) -> Option<OwnerId> {
        None
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn resolves_root_and_misses_unknown_names() {
        assert_eq!(NixAccounts.uid_for_name("root"), Some(0));
        assert_eq!(NixAccounts.uid_for_name("no-such-account-droidwall"), None);
    }
}
