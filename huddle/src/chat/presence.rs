//! Presence registry: the set of participants currently known to be online.
//!
//! Records are unique by identity and kept in insertion order so the
//! sidebar renders deterministically.

/// An online participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: String,
    /// First character of the identity, upper-cased.
    pub initial: char,
    /// Always `true` for held records; absence means offline.
    pub online: bool,
}

impl Participant {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let initial = identity
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?');
        Self {
            identity,
            initial,
            online: true,
        }
    }
}

/// Deduplicated, insertion-ordered participant list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceRegistry {
    participants: Vec<Participant>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `identity` unless already present. Returns whether it was added.
    pub fn add(&mut self, identity: &str) -> bool {
        if identity.is_empty() || self.contains(identity) {
            return false;
        }
        self.participants.push(Participant::new(identity));
        true
    }

    /// Removes `identity` if present. Returns whether it was removed.
    pub fn remove(&mut self, identity: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.identity != identity);
        self.participants.len() != before
    }

    /// Rebuilds the registry from a roster snapshot.
    ///
    /// An empty snapshot changes nothing. Otherwise every identity except
    /// `local_identity` is taken from the snapshot; the local record
    /// survives only if it was already held (the optimistic add on join).
    /// Returns whether the registry changed.
    pub fn replace_from_snapshot(&mut self, identities: &[String], local_identity: &str) -> bool {
        if identities.is_empty() {
            return false;
        }

        let mut rebuilt = Self::new();
        if !local_identity.is_empty() && self.contains(local_identity) {
            rebuilt.add(local_identity);
        }
        for identity in identities {
            if identity != local_identity {
                rebuilt.add(identity);
            }
        }

        if rebuilt == *self {
            return false;
        }
        *self = rebuilt;
        true
    }

    /// Forgets everyone.
    pub fn clear(&mut self) {
        self.participants.clear();
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.participants.iter().any(|p| p.identity == identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Identities in display order.
    #[must_use]
    pub fn identities(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.identity.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn initial_is_uppercased_first_char() {
        assert_eq!(Participant::new("alice").initial, 'A');
        assert_eq!(Participant::new("élodie").initial, 'É');
        assert_eq!(Participant::new("").initial, '?');
    }

    #[test]
    fn add_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.add("alice"));
        assert!(!registry.add("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_ignores_empty_identity() {
        let mut registry = PresenceRegistry::new();
        assert!(!registry.add(""));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.add("alice");
        assert!(!registry.remove("bob"));
        assert!(registry.remove("alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut registry = PresenceRegistry::new();
        registry.add("carol");
        registry.add("alice");
        registry.add("bob");
        assert_eq!(registry.identities(), names(&["carol", "alice", "bob"]));
    }

    #[test]
    fn empty_snapshot_is_noop() {
        let mut registry = PresenceRegistry::new();
        registry.add("alice");
        assert!(!registry.replace_from_snapshot(&[], "bob"));
        assert_eq!(registry.identities(), names(&["alice"]));
    }

    #[test]
    fn snapshot_filters_self() {
        let mut registry = PresenceRegistry::new();
        registry.replace_from_snapshot(&names(&["a", "b", "c"]), "b");
        assert_eq!(registry.identities(), names(&["a", "c"]));
    }

    #[test]
    fn snapshot_keeps_optimistic_self_record() {
        let mut registry = PresenceRegistry::new();
        registry.add("bob");
        registry.replace_from_snapshot(&names(&["bob", "carol"]), "bob");
        assert_eq!(registry.identities(), names(&["bob", "carol"]));
    }

    #[test]
    fn snapshot_drops_stale_entries_and_duplicates() {
        let mut registry = PresenceRegistry::new();
        registry.add("dave");
        registry.replace_from_snapshot(&names(&["erin", "erin", "", "frank"]), "");
        assert_eq!(registry.identities(), names(&["erin", "frank"]));
        assert!(registry.iter().all(|p| p.online));
    }

    #[test]
    fn unchanged_snapshot_reports_no_change() {
        let mut registry = PresenceRegistry::new();
        registry.add("a");
        registry.add("c");
        assert!(!registry.replace_from_snapshot(&names(&["a", "c"]), "b"));
    }

    #[test]
    fn clear_empties() {
        let mut registry = PresenceRegistry::new();
        registry.add("alice");
        registry.clear();
        assert!(registry.is_empty());
    }
}
