//! Peer identifier classification.
//!
//! The user types a single string into the "connect" box.  It is either a
//! lease id handed out by the rendezvous service (digits, usually displayed in
//! groups of three) or a direct `host:port` address.  The choice decides the
//! transport of the whole client session and is made exactly once, when the
//! session is created.
//!
//! ```text
//! "123 456 789"    ──►  Lease("123456789")       ──►  Signal transport
//! "10.0.0.5:9051"  ──►  Direct("10.0.0.5:9051")  ──►  Direct transport
//! ```

use crate::engine::TransportKind;

/// Classified peer identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerTarget {
    /// Numeric rendezvous lease id, whitespace removed.
    Lease(String),
    /// Direct network address, whitespace removed.
    Direct(String),
}

impl PeerTarget {
    /// Classifies a user-typed identifier.
    ///
    /// All whitespace is stripped first; a non-empty, digits-only remainder is
    /// a lease id, anything else is a direct address.
    pub fn classify(input: &str) -> Self {
        let stripped: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            Self::Lease(stripped)
        } else {
            Self::Direct(stripped)
        }
    }

    /// Transport implied by the classification.
    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Lease(_) => TransportKind::Signal,
            Self::Direct(_) => TransportKind::Direct,
        }
    }

    /// The normalised identifier (lease id or address).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lease(id) | Self::Direct(id) => id,
        }
    }
}

/// Formats a session id for display, grouping digits in threes.
///
/// Ids longer than nine digits get a single leading digit group
/// (`"1234567890"` → `"1 234 567 890"`).  Only the first 13 characters are
/// considered.  Input that is not made of digits and whitespace is returned
/// unchanged.
pub fn format_session_id(id: &str) -> String {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return id.to_string();
    }

    let digits: String = id
        .chars()
        .take(13)
        .filter(|c| c.is_ascii_digit())
        .collect();

    let (head, rest) = if digits.len() > 9 {
        digits.split_at(1)
    } else {
        ("", digits.as_str())
    };

    let mut groups: Vec<&str> = Vec::new();
    if !head.is_empty() {
        groups.push(head);
    }
    let mut remaining = rest;
    while !remaining.is_empty() {
        let take = remaining.len().min(3);
        let (group, tail) = remaining.split_at(take);
        groups.push(group);
        remaining = tail;
    }
    groups.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_spaced_digits_as_lease() {
        let target = PeerTarget::classify("123 456 789");
        assert_eq!(target, PeerTarget::Lease("123456789".to_string()));
        assert_eq!(target.transport(), TransportKind::Signal);
    }

    #[test]
    fn test_classify_socket_address_as_direct() {
        let target = PeerTarget::classify("10.0.0.5:9051");
        assert_eq!(target, PeerTarget::Direct("10.0.0.5:9051".to_string()));
        assert_eq!(target.transport(), TransportKind::Direct);
    }

    #[test]
    fn test_classify_strips_tabs_and_newlines() {
        let target = PeerTarget::classify("\t987\n654 ");
        assert_eq!(target.as_str(), "987654");
    }

    #[test]
    fn test_classify_hostname_with_digits_is_direct() {
        let target = PeerTarget::classify("host42:9051");
        assert_eq!(target.transport(), TransportKind::Direct);
    }

    #[test]
    fn test_classify_blank_input_is_direct() {
        // Nothing to rendezvous with; the direct connect will fail and be
        // reported through the normal failure path.
        assert_eq!(PeerTarget::classify("   "), PeerTarget::Direct(String::new()));
    }

    #[test]
    fn test_format_nine_digits_in_three_groups() {
        assert_eq!(format_session_id("123456789"), "123 456 789");
    }

    #[test]
    fn test_format_ten_digits_has_leading_single_digit() {
        assert_eq!(format_session_id("1234567890"), "1 234 567 890");
    }

    #[test]
    fn test_format_short_id_keeps_partial_group() {
        assert_eq!(format_session_id("12345"), "123 45");
    }

    #[test]
    fn test_format_regroups_already_spaced_id() {
        assert_eq!(format_session_id("12 3456 789"), "123 456 789");
    }

    #[test]
    fn test_format_leaves_addresses_untouched() {
        assert_eq!(format_session_id("10.0.0.5:9051"), "10.0.0.5:9051");
    }
}
