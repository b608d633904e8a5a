//! In-memory form of the persisted lock table.
//!
//! Pure data and compatibility rules; persistence lives in
//! [`super::store`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Mode, Owner};

/// Current lock table format version.
pub const TABLE_VERSION: u32 = 1;

/// One owner holding a mode, possibly several levels deep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub owner: Owner,
    /// Reentrant levels; always > 0 in a stored record.
    pub depth: u32,
    pub since: DateTime<Utc>,
}

impl Holder {
    fn new(owner: &Owner) -> Self {
        Self {
            owner: owner.clone(),
            depth: 1,
            since: Utc::now(),
        }
    }
}

/// Lock state of a single resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<Holder>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared: Vec<Holder>,
}

impl LockRecord {
    /// Strongest mode currently held, `None` for an empty record.
    pub fn mode(&self) -> Option<Mode> {
        if self.exclusive.is_some() {
            Some(Mode::Exclusive)
        } else if !self.shared.is_empty() {
            Some(Mode::Shared)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }

    /// All holders together with the mode they hold.
    pub fn holders(&self) -> impl Iterator<Item = (Mode, &Holder)> {
        self.exclusive
            .iter()
            .map(|h| (Mode::Exclusive, h))
            .chain(self.shared.iter().map(|h| (Mode::Shared, h)))
    }

    pub fn contains(&self, owner: &Owner) -> bool {
        self.holders().any(|(_, h)| h.owner.is(owner))
    }

    /// Whether anybody but `owner` holds this resource in any mode.
    pub fn holds_other(&self, owner: &Owner) -> bool {
        self.holders().any(|(_, h)| !h.owner.is(owner))
    }

    /// First holder standing in the way of `owner`, exclusive holders first.
    pub fn blocker(&self, owner: &Owner) -> Option<&Holder> {
        self.holders()
            .map(|(_, h)| h)
            .find(|h| !h.owner.is(owner))
    }

    /// Add one level of `mode` for `owner` if compatible.
    ///
    /// An owner may mix modes on one resource as long as no other owner is
    /// involved; `Mode::None` always succeeds without changing the record.
    pub fn try_lock(&mut self, mode: Mode, owner: &Owner) -> bool {
        match mode {
            Mode::None => true,
            Mode::Exclusive => {
                if self.holds_other(owner) {
                    return false;
                }
                match &mut self.exclusive {
                    Some(holder) => holder.depth += 1,
                    None => self.exclusive = Some(Holder::new(owner)),
                }
                true
            }
            Mode::Shared => {
                let blocked = self
                    .exclusive
                    .as_ref()
                    .is_some_and(|h| !h.owner.is(owner));
                if blocked {
                    return false;
                }
                match self.shared.iter_mut().find(|h| h.owner.is(owner)) {
                    Some(holder) => holder.depth += 1,
                    None => self.shared.push(Holder::new(owner)),
                }
                true
            }
        }
    }

    /// Remove one level of `mode` held by `owner`. Returns false if not held.
    pub fn release(&mut self, mode: Mode, owner: &Owner) -> bool {
        match mode {
            Mode::None => true,
            Mode::Exclusive => match &mut self.exclusive {
                Some(holder) if holder.owner.is(owner) => {
                    holder.depth -= 1;
                    if holder.depth == 0 {
                        self.exclusive = None;
                    }
                    true
                }
                _ => false,
            },
            Mode::Shared => {
                let Some(idx) = self.shared.iter().position(|h| h.owner.is(owner)) else {
                    return false;
                };
                self.shared[idx].depth -= 1;
                if self.shared[idx].depth == 0 {
                    self.shared.remove(idx);
                }
                true
            }
        }
    }

    /// Drop every level held by `owner`. Returns true if anything changed.
    pub fn release_all(&mut self, owner: &Owner) -> bool {
        let before = self.shared.len();
        self.shared.retain(|h| !h.owner.is(owner));
        let mut changed = before != self.shared.len();
        if self.exclusive.as_ref().is_some_and(|h| h.owner.is(owner)) {
            self.exclusive = None;
            changed = true;
        }
        changed
    }

    fn check(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("empty record".to_string());
        }
        if self.holders().any(|(_, h)| h.depth == 0) {
            return Err("holder with depth 0".to_string());
        }
        for (i, a) in self.shared.iter().enumerate() {
            if self.shared[i + 1..].iter().any(|b| b.owner.is(&a.owner)) {
                return Err(format!("duplicate shared holder {}", a.owner));
            }
        }
        if let Some(exclusive) = &self.exclusive
            && self.shared.iter().any(|h| !h.owner.is(&exclusive.owner))
        {
            return Err(format!(
                "exclusive holder {} coexists with other shared holders",
                exclusive.owner
            ));
        }
        Ok(())
    }
}

/// Lock records of all resources of one installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockTable {
    pub version: u32,
    #[serde(default)]
    pub locks: BTreeMap<String, LockRecord>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            version: TABLE_VERSION,
            locks: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn record(&self, resource: &str) -> Option<&LockRecord> {
        self.locks.get(resource)
    }

    /// Try to add one level; on conflict returns a copy of the blocking record.
    pub fn try_lock(
        &mut self,
        resource: &str,
        mode: Mode,
        owner: &Owner,
    ) -> Result<(), LockRecord> {
        if mode == Mode::None {
            return Ok(());
        }
        let record = self.locks.entry(resource.to_string()).or_default();
        if record.try_lock(mode, owner) {
            return Ok(());
        }
        Err(record.clone())
    }

    /// Remove one level; empty records are dropped. Returns false if not held.
    pub fn release(&mut self, resource: &str, mode: Mode, owner: &Owner) -> bool {
        if mode == Mode::None {
            return true;
        }
        let Some(record) = self.locks.get_mut(resource) else {
            return false;
        };
        let released = record.release(mode, owner);
        if record.is_empty() {
            self.locks.remove(resource);
        }
        released
    }

    /// Drop everything `owner` holds. Returns the affected resources.
    pub fn release_all(&mut self, owner: &Owner) -> Vec<String> {
        let mut affected = Vec::new();
        for (resource, record) in self.locks.iter_mut() {
            if record.release_all(owner) {
                affected.push(resource.clone());
            }
        }
        self.locks.retain(|_, record| !record.is_empty());
        affected
    }

    /// Distinct owners holding anything, in table order.
    pub fn owners(&self) -> Vec<Owner> {
        let mut result: Vec<Owner> = Vec::new();
        for record in self.locks.values() {
            for (_, holder) in record.holders() {
                if !result.iter().any(|o| o.is(&holder.owner)) {
                    result.push(holder.owner.clone());
                }
            }
        }
        result
    }

    /// Check format version and the per-record invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != TABLE_VERSION {
            return Err(format!("unsupported lock table version: {}", self.version));
        }
        for (resource, record) in &self.locks {
            record
                .check()
                .map_err(|problem| format!("resource '{resource}': {problem}"))?;
        }
        Ok(())
    }
}
