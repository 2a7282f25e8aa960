//! Storage layout shared by the durable backends
//!
//! Issue table keyed by issue id; ledger keyed by `(issue_id, sequence)`.
//! Sequence numbers are zero-padded so that lexicographic key order equals
//! ledger order.

/// Column family for issue rows
pub const CF_ISSUES: &str = "issues";

/// Column family for escalation ledger entries
pub const CF_ESCALATIONS: &str = "escalations";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_ISSUES, CF_ESCALATIONS];

/// Key builders for compound keys
pub mod keys {
    /// Issue row key
    pub fn issue(issue_id: &str) -> String {
        format!("issue:{}", issue_id)
    }

    /// Prefix for all ledger entries of one issue
    pub fn escalation_prefix(issue_id: &str) -> String {
        format!("esc:{}:", issue_id)
    }

    /// Ledger entry key
    pub fn escalation(issue_id: &str, sequence: u32) -> String {
        format!("esc:{}:{:010}", issue_id, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        assert_eq!(keys::issue("abc"), "issue:abc");
        assert_eq!(keys::escalation("abc", 7), "esc:abc:0000000007");
        assert!(keys::escalation("abc", 7).starts_with(&keys::escalation_prefix("abc")));
    }

    #[test]
    fn test_escalation_key_ordering() {
        assert!(keys::escalation("abc", 9) < keys::escalation("abc", 10));
    }
}
