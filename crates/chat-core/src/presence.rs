use std::collections::HashSet;

use crate::types::Identity;

/// Current set of online participants, replaced wholesale on every push.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    roster: Vec<Identity>,
}

impl PresenceTracker {
    /// Replace the roster with a server push.
    ///
    /// Arrival order is preserved; repeated connection ids keep their first entry.
    pub fn replace(&mut self, users: Vec<Identity>) {
        let mut seen = HashSet::with_capacity(users.len());
        self.roster = users
            .into_iter()
            .filter(|user| seen.insert(user.connection_id.clone()))
            .collect();
    }

    /// Full roster in arrival order.
    pub fn roster(&self) -> &[Identity] {
        &self.roster
    }

    /// Roster without the local identity.
    pub fn peers_excluding(&self, local_connection_id: Option<&str>) -> Vec<Identity> {
        self.roster
            .iter()
            .filter(|user| Some(user.connection_id.as_str()) != local_connection_id)
            .cloned()
            .collect()
    }

    pub fn find(&self, connection_id: &str) -> Option<&Identity> {
        self.roster
            .iter()
            .find(|user| user.connection_id == connection_id)
    }

    pub fn is_online(&self, connection_id: &str) -> bool {
        self.find(connection_id).is_some()
    }

    pub fn clear(&mut self) {
        self.roster.clear();
    }
}
