/// Suppresses relay of the bridge's own messages in both directions.
///
/// A message the bridge posts on one side is observed by its own poller or
/// notification hook on that side; without this check it would be relayed
/// back and loop forever. The bridge connects exactly two sides, so
/// comparing against the two bridge identities is sufficient.
#[derive(Debug, Clone)]
pub struct EchoGuard {
    remote_bridge_user_id: String,
    local_bridge_username: String,
}

impl EchoGuard {
    pub fn new(remote_bridge_user_id: &str, local_bridge_username: &str) -> Self {
        Self {
            remote_bridge_user_id: remote_bridge_user_id.trim().to_string(),
            local_bridge_username: local_bridge_username.to_string(),
        }
    }

    /// True when a remote event was sent by the bridge's own Matrix account.
    pub fn suppress_inbound(&self, sender: &str) -> bool {
        sender.trim() == self.remote_bridge_user_id
    }

    /// True when a local message was authored by the bridge's own account.
    pub fn suppress_outbound(&self, username: &str) -> bool {
        username == self.local_bridge_username
    }

    pub fn local_bridge_username(&self) -> &str {
        &self.local_bridge_username
    }
}

#[cfg(test)]
mod tests {
    use super::EchoGuard;

    fn guard() -> EchoGuard {
        EchoGuard::new("@bridge:example.org", "matrix_bridge")
    }

    #[test]
    fn inbound_suppresses_remote_bridge_identity() {
        assert!(guard().suppress_inbound("@bridge:example.org"));
        assert!(guard().suppress_inbound("  @bridge:example.org  "));
    }

    #[test]
    fn inbound_passes_other_senders() {
        assert!(!guard().suppress_inbound("@alice:example.org"));
        assert!(!guard().suppress_inbound(""));
    }

    #[test]
    fn outbound_suppresses_local_bridge_identity() {
        assert!(guard().suppress_outbound("matrix_bridge"));
        assert!(!guard().suppress_outbound("alice"));
    }

    #[test]
    fn trims_configured_remote_identity() {
        let guard = EchoGuard::new("  @bridge:example.org ", "matrix_bridge");
        assert!(guard.suppress_inbound("@bridge:example.org"));
    }
}
