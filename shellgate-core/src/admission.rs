use shellgate_common::ShellgateConfig;

/// Operator-side allow-listing of reachable hosts. This is a safeguard
/// against misconfigured inventories, not a firewall: matching is exact,
/// with no wildcards and no DNS resolution.
pub struct HostAdmission {
    allowed: Vec<String>,
}

impl HostAdmission {
    pub fn new(config: &ShellgateConfig) -> Self {
        Self {
            allowed: config.allowed_ssh_hosts.clone(),
        }
    }

    pub fn admit(&self, host: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|allowed| allowed == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admission(hosts: &[&str]) -> HostAdmission {
        HostAdmission {
            allowed: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_list_admits_everything() {
        assert!(admission(&[]).admit("10.0.0.9"));
    }

    #[test]
    fn test_exact_match_only() {
        let admission = admission(&["10.0.0.2", "bastion.internal"]);
        assert!(admission.admit("10.0.0.2"));
        assert!(admission.admit("bastion.internal"));
        assert!(!admission.admit("10.0.0.9"));
        assert!(!admission.admit("host.bastion.internal"));
    }
}
