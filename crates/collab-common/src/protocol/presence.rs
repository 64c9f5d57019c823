//! Presence snapshot payload

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Section name -> display names of the users currently viewing it
///
/// Always a complete picture of a room; a client replaces whatever it held
/// before. Sections with nobody in them are absent rather than empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot(BTreeMap<String, Vec<String>>);

impl PresenceSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `display_name` to `section`
    ///
    /// Names are not deduplicated here: two different users may share a
    /// display name. Callers decide what counts as the same viewer.
    pub fn insert(&mut self, section: impl Into<String>, display_name: impl Into<String>) {
        self.0.entry(section.into()).or_default().push(display_name.into());
    }

    /// Users viewing a section (empty if nobody)
    #[must_use]
    pub fn users_in(&self, section: &str) -> &[String] {
        self.0.get(section).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sections with at least one viewer, in name order
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Total number of (section, user) entries
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S, N> FromIterator<(S, N)> for PresenceSnapshot
where
    S: Into<String>,
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, N)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (section, name) in iter {
            snapshot.insert(section, name);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut snapshot = PresenceSnapshot::new();
        snapshot.insert("wbs", "Alice");
        snapshot.insert("wbs", "Bob");
        snapshot.insert("wbs", "Alice");
        snapshot.insert("pricing", "Carol");

        assert_eq!(snapshot.users_in("wbs"), ["Alice", "Bob", "Alice"]);
        assert_eq!(snapshot.users_in("pricing"), ["Carol"]);
        assert!(snapshot.users_in("schedule").is_empty());
        assert_eq!(snapshot.entry_count(), 4);
        assert_eq!(snapshot.sections().collect::<Vec<_>>(), ["pricing", "wbs"]);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let snapshot: PresenceSnapshot = [("wbs", "Alice"), ("pricing", "Bob")].into_iter().collect();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json, serde_json::json!({"wbs": ["Alice"], "pricing": ["Bob"]}));
    }
}
