//! Roster of remote attendees keyed by id, plus the local attendee's state.

mod entry;


pub use entry::AttendeeEntry;

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, info};
use workspaces_common::{Result, WorkspaceError};

use crate::media::MediaCapability;
use crate::protocol::AttendeeInfo;

/// Remote attendees of the joined workspace.
///
/// The local attendee is tracked separately and is never inserted as an
/// entry; state operations dispatch to it by id.
#[derive(Default)]
pub struct AttendeeRegistry {
    local: Option<AttendeeInfo>,
    local_state: Map<String, Value>,
    entries: HashMap<String, AttendeeEntry>,
}

impl AttendeeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the local attendee. An entry with the same id is
    /// evicted so the local id never doubles as a registry key.
    pub fn set_local(&mut self, local: Option<AttendeeInfo>, media: &dyn MediaCapability) {
        if let Some(info) = &local {
            if let Some(mut stale) = self.entries.remove(&info.id) {
                stale.release_connection(media);
            }
        }
        self.local = local;
    }

    pub fn local(&self) -> Option<&AttendeeInfo> {
        self.local.as_ref()
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local.as_ref().map(|a| a.id.as_str())
    }

    pub fn is_local(&self, id: &str) -> bool {
        self.local_id() == Some(id)
    }

    /// Insert a remote attendee. Returns `false` for the local id or an
    /// attendee that is already present.
    pub fn add(&mut self, info: AttendeeInfo) -> bool {
        if self.is_local(&info.id) || self.entries.contains_key(&info.id) {
            return false;
        }
        debug!(attendee_id = %info.id, name = %info.name, "Attendee added");
        self.entries.insert(info.id.clone(), AttendeeEntry::new(info));
        true
    }

    /// Release everything the entry owns, then drop it.
    pub fn remove(&mut self, id: &str, media: &dyn MediaCapability) -> Option<AttendeeInfo> {
        let mut entry = self.entries.remove(id)?;
        entry.release_connection(media);
        info!(attendee_id = %id, "Attendee removed");
        Some(entry.info)
    }

    /// Replace the roster with `attendees`, releasing anyone no longer listed.
    pub fn sync(&mut self, attendees: Vec<AttendeeInfo>, media: &dyn MediaCapability) {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !attendees.iter().any(|a| &a.id == *id))
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id, media);
        }
        for info in attendees {
            self.add(info);
        }
    }

    /// Release and drop every entry, and forget the local attendee.
    pub fn clear(&mut self, media: &dyn MediaCapability) {
        for (_, mut entry) in self.entries.drain() {
            entry.release_connection(media);
        }
        self.local = None;
        self.local_state.clear();
    }

    pub fn get(&self, id: &str) -> Option<&AttendeeEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AttendeeEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttendeeEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AttendeeEntry> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -----------------------------------------------------------------------
    // Attendee state
    // -----------------------------------------------------------------------

    fn state_mut(&mut self, id: &str) -> Result<&mut Map<String, Value>> {
        if self.is_local(id) {
            return Ok(&mut self.local_state);
        }
        self.entries
            .get_mut(id)
            .map(|e| &mut e.state)
            .ok_or_else(|| WorkspaceError::UnknownAttendee(id.to_string()))
    }

    /// Shallow-merge `values` into the attendee's state.
    pub fn set_state(&mut self, id: &str, values: Map<String, Value>) -> Result<()> {
        if let Some(key) = values.keys().find(|k| k.is_empty()) {
            return Err(WorkspaceError::InvalidStateKey(key.clone()));
        }
        let state = self.state_mut(id)?;
        state.extend(values);
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<&Map<String, Value>> {
        if self.is_local(id) {
            return Some(&self.local_state);
        }
        self.entries.get(id).map(|e| &e.state)
    }

    /// Delete `keys` from the attendee's state.
    pub fn clear_state(&mut self, id: &str, keys: &[&str]) -> Result<()> {
        if let Some(key) = keys.iter().find(|k| k.is_empty()) {
            return Err(WorkspaceError::InvalidStateKey((*key).to_string()));
        }
        let state = self.state_mut(id)?;
        for key in keys {
            state.remove(*key);
        }
        Ok(())
    }

    /// Delete `keys` from every attendee's state, local included.
    pub fn clear_all_states(&mut self, keys: &[&str]) -> Result<()> {
        if let Some(key) = keys.iter().find(|k| k.is_empty()) {
            return Err(WorkspaceError::InvalidStateKey((*key).to_string()));
        }
        for key in keys {
            self.local_state.remove(*key);
            for entry in self.entries.values_mut() {
                entry.state.remove(*key);
            }
        }
        Ok(())
    }

    /// Ids (local included) whose state satisfies `predicate`.
    pub fn filter_state<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&Map<String, Value>) -> bool,
    {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| predicate(&e.state))
            .map(|e| e.info.id.clone())
            .collect();
        if let Some(local) = &self.local {
            if predicate(&self.local_state) {
                ids.push(local.id.clone());
            }
        }
        ids
    }
}
