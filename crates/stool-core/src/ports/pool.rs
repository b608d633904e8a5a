//! Stateless port allocator.
//!
//! A [`Pool`] is built from the current assignments of all stages each time
//! it is needed and discarded afterwards. Removing a stage (or re-pointing a
//! label) frees ports without any explicit release.

use std::collections::{BTreeMap, BTreeSet};
use std::net::TcpListener;

use super::{PoolError, PortAssignment, PortRange};
use crate::stage::{StageStore, StoreError};

/// One label to (re)allocate, optionally pinned to a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRequest {
    pub label: String,
    pub port: Option<u16>,
}

impl PortRequest {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            port: None,
        }
    }

    pub fn fixed(label: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            port: Some(port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Reservation {
    stage: String,
    label: String,
}

#[derive(Debug, Clone)]
pub struct Pool {
    range: PortRange,
    /// Even port to everybody claiming it; more than one entry only after
    /// hand edits.
    reserved: BTreeMap<u16, Vec<Reservation>>,
    probe: bool,
}

impl Pool {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            reserved: BTreeMap::new(),
            probe: false,
        }
    }

    /// Skip fresh ports that cannot be bound on this host.
    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe = probe;
        self
    }

    /// Pool reflecting the persisted assignments of every stage in `store`.
    pub fn load(range: PortRange, store: &StageStore) -> Result<Self, StoreError> {
        let mut pool = Self::new(range);
        for stage in store.list()? {
            pool.add(&stage.name, &stage.ports);
        }
        Ok(pool)
    }

    pub fn from_assignments<'a>(
        range: PortRange,
        assignments: impl IntoIterator<Item = (&'a str, &'a PortAssignment)>,
    ) -> Self {
        let mut pool = Self::new(range);
        for (stage, assignment) in assignments {
            pool.add(stage, assignment);
        }
        pool
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Record the ports of `stage` as used.
    pub fn add(&mut self, stage: &str, assignment: &PortAssignment) {
        for entry in assignment {
            self.reserve(entry.port, stage, &entry.label);
        }
    }

    /// Drop every reservation of `stage`.
    pub fn forget(&mut self, stage: &str) {
        for claims in self.reserved.values_mut() {
            claims.retain(|r| r.stage != stage);
        }
        self.reserved.retain(|_, claims| !claims.is_empty());
    }

    /// All ports reserved by any stage, both halves of every pair.
    pub fn used(&self) -> BTreeSet<u16> {
        let mut result = BTreeSet::new();
        for even in self.reserved.keys() {
            result.insert(*even);
            result.insert(even.saturating_add(1));
        }
        result
    }

    /// Stage and label holding `even`, if any.
    pub fn owner_of(&self, even: u16) -> Option<(&str, &str)> {
        self.reserved
            .get(&even)
            .and_then(|claims| claims.first())
            .map(|r| (r.stage.as_str(), r.label.as_str()))
    }

    /// Allocate the even port for `label` of `stage`.
    ///
    /// The port recorded in `previous` is kept when it is still inside the
    /// range and nobody else claims it; otherwise the lowest free even port
    /// is taken.
    pub fn allocate(
        &mut self,
        stage: &str,
        label: &str,
        previous: Option<&PortAssignment>,
    ) -> Result<u16, PoolError> {
        match self.reuse(stage, label, previous) {
            Some(port) => Ok(port),
            None => self.fresh(stage, label),
        }
    }

    /// Reserve an operator-chosen port for `label` of `stage`.
    pub fn allocate_fixed(
        &mut self,
        stage: &str,
        label: &str,
        port: u16,
    ) -> Result<u16, PoolError> {
        self.pin(stage, label, port, true)
    }

    /// Recompute the complete assignment of `stage`.
    ///
    /// Fixed ports are pinned first, then every retained label takes back its
    /// previous port, and only then are fresh ports handed to new labels, so
    /// a new label never takes the port of a label that stays. The result
    /// follows request order; labels of `previous` that are not requested
    /// any more are dropped and their ports become free.
    pub fn assign(
        &mut self,
        stage: &str,
        requests: &[PortRequest],
        previous: Option<&PortAssignment>,
    ) -> Result<PortAssignment, PoolError> {
        self.forget(stage);

        let mut seen = BTreeSet::new();
        let requests: Vec<&PortRequest> = requests
            .iter()
            .filter(|r| seen.insert(r.label.as_str()))
            .collect();
        let mut ports: Vec<Option<u16>> = vec![None; requests.len()];

        for (slot, request) in ports.iter_mut().zip(&requests) {
            if let Some(port) = request.port {
                // the stage's own workload may still be bound to its old port
                let unchanged = previous.and_then(|p| p.get(&request.label)) == Some(port);
                *slot = Some(self.pin(stage, &request.label, port, !unchanged)?);
            }
        }
        for (slot, request) in ports.iter_mut().zip(&requests) {
            if slot.is_none() {
                *slot = self.reuse(stage, &request.label, previous);
            }
        }

        let mut result = PortAssignment::new();
        for (slot, request) in ports.into_iter().zip(&requests) {
            let port = match slot {
                Some(port) => port,
                None => self.fresh(stage, &request.label)?,
            };
            result.set(request.label.clone(), port);
        }
        Ok(result)
    }

    /// First free even port, without reserving it.
    pub fn temp(&self) -> Result<u16, PoolError> {
        self.range
            .evens()
            .find(|even| !self.reserved.contains_key(even))
            .ok_or_else(|| PoolError::Exhausted {
                stage: String::new(),
                label: "temp".to_string(),
                first: self.range.first(),
                last: self.range.last(),
            })
    }

    /// Reserve the previous port of `label` again if it is still valid.
    fn reuse(
        &mut self,
        stage: &str,
        label: &str,
        previous: Option<&PortAssignment>,
    ) -> Option<u16> {
        let port = previous?.get(label)?;
        if !self.range.contains_pair(port) {
            tracing::warn!(
                stage,
                label,
                port,
                "previous port outside pool range, reallocating"
            );
            return None;
        }
        if let Some(other) = self.claimed_by_other(port, stage, label) {
            tracing::warn!(
                stage,
                label,
                port,
                other_stage = %other.stage,
                other_label = %other.label,
                "previous port claimed elsewhere, reallocating"
            );
            return None;
        }
        self.reserve(port, stage, label);
        Some(port)
    }

    /// Reserve the lowest free even port.
    fn fresh(&mut self, stage: &str, label: &str) -> Result<u16, PoolError> {
        let free = self
            .range
            .evens()
            .find(|even| !self.reserved.contains_key(even) && self.bindable_pair(*even));
        match free {
            Some(even) => {
                self.reserve(even, stage, label);
                tracing::debug!(stage, label, port = even, "allocated port");
                Ok(even)
            }
            None => Err(PoolError::Exhausted {
                stage: stage.to_string(),
                label: label.to_string(),
                first: self.range.first(),
                last: self.range.last(),
            }),
        }
    }

    fn pin(&mut self, stage: &str, label: &str, port: u16, probe: bool) -> Result<u16, PoolError> {
        if port % 2 != 0 {
            return Err(PoolError::OddPort { port });
        }
        if !self.range.contains_pair(port) {
            return Err(PoolError::OutOfRange {
                port,
                first: self.range.first(),
                last: self.range.last(),
            });
        }
        if let Some(other) = self.claimed_by_other(port, stage, label) {
            return Err(PoolError::Reserved {
                port,
                stage: other.stage.clone(),
                label: other.label.clone(),
            });
        }
        let already_mine = self.reserved.contains_key(&port);
        if probe && !already_mine && !self.bindable_pair(port) {
            return Err(PoolError::Busy { port });
        }
        self.reserve(port, stage, label);
        Ok(port)
    }

    fn reserve(&mut self, even: u16, stage: &str, label: &str) {
        let claims = self.reserved.entry(even).or_default();
        if !claims.iter().any(|r| r.stage == stage && r.label == label) {
            claims.push(Reservation {
                stage: stage.to_string(),
                label: label.to_string(),
            });
        }
    }

    /// A claim on `even` other than `(stage, label)` itself.
    fn claimed_by_other(&self, even: u16, stage: &str, label: &str) -> Option<&Reservation> {
        self.reserved
            .get(&even)?
            .iter()
            .find(|r| r.stage != stage || r.label != label)
    }

    fn bindable_pair(&self, even: u16) -> bool {
        !self.probe || (bindable(even) && bindable(even.saturating_add(1)))
    }
}

fn bindable(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(first: u16, last: u16) -> PortRange {
        PortRange::new(first, last).unwrap()
    }

    #[test]
    fn scans_upward_skipping_used() {
        let mut pool = Pool::new(range(9000, 9009));
        assert_eq!(pool.allocate("a", "control", None).unwrap(), 9000);
        assert_eq!(pool.allocate("a", "web", None).unwrap(), 9002);
        assert_eq!(pool.allocate("b", "control", None).unwrap(), 9004);

        let used: Vec<u16> = pool.used().into_iter().collect();
        assert_eq!(used, vec![9000, 9001, 9002, 9003, 9004, 9005]);
    }

    #[test]
    fn forget_frees_ports() {
        let mut pool = Pool::new(range(9000, 9003));
        pool.allocate("a", "control", None).unwrap();
        pool.forget("a");

        assert_eq!(pool.allocate("b", "control", None).unwrap(), 9000);
    }

    #[test]
    fn temp_does_not_reserve() {
        let mut pool = Pool::new(range(9000, 9005));
        pool.allocate("a", "control", None).unwrap();

        assert_eq!(pool.temp().unwrap(), 9002);
        assert_eq!(pool.temp().unwrap(), 9002);
    }

    #[test]
    fn fixed_port_must_be_even_and_in_range() {
        let mut pool = Pool::new(range(9000, 9009));

        assert_eq!(
            pool.allocate_fixed("a", "web", 9003),
            Err(PoolError::OddPort { port: 9003 })
        );
        assert!(matches!(
            pool.allocate_fixed("a", "web", 8000),
            Err(PoolError::OutOfRange { .. })
        ));
        assert_eq!(pool.allocate_fixed("a", "web", 9004), Ok(9004));
    }

    #[test]
    fn fixed_port_reserved_elsewhere_is_rejected() {
        let mut pool = Pool::new(range(9000, 9009));
        pool.allocate_fixed("a", "web", 9004).unwrap();

        let err = pool.allocate_fixed("b", "web", 9004).unwrap_err();
        assert_eq!(
            err,
            PoolError::Reserved {
                port: 9004,
                stage: "a".to_string(),
                label: "web".to_string(),
            }
        );
    }

    #[test]
    fn assign_skips_duplicate_labels() {
        let mut pool = Pool::new(range(9000, 9009));
        let requests = vec![
            PortRequest::label("control"),
            PortRequest::label("web"),
            PortRequest::label("web"),
        ];

        let assignment = pool.assign("a", &requests, None).unwrap();

        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.get("web"), Some(9002));
    }
}
