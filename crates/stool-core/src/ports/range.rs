use serde::{Deserialize, Serialize};

use super::PoolError;

/// Operator-configured bounds `[first, last]` of the port pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct PortRange {
    first: u16,
    last: u16,
}

impl PortRange {
    /// `first` must be even and the range must hold at least one pair.
    pub fn new(first: u16, last: u16) -> Result<Self, PoolError> {
        let invalid = |reason: &str| PoolError::InvalidRange {
            first,
            last,
            reason: reason.to_string(),
        };
        if first % 2 != 0 {
            return Err(invalid("first port must be even"));
        }
        if u32::from(first) + 1 > u32::from(last) {
            return Err(invalid("range must hold at least one port pair"));
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> u16 {
        self.first
    }

    pub fn last(&self) -> u16 {
        self.last
    }

    /// Whether `even` starts a pair lying completely inside the range.
    pub fn contains_pair(&self, even: u16) -> bool {
        even % 2 == 0 && even >= self.first && u32::from(even) + 1 <= u32::from(self.last)
    }

    /// Allocatable even ports in increasing order.
    pub fn evens(&self) -> impl Iterator<Item = u16> + '_ {
        (self.first..=self.last)
            .step_by(2)
            .filter(|even| self.contains_pair(*even))
    }

    /// Number of allocatable pairs.
    pub fn capacity(&self) -> usize {
        ((u32::from(self.last) - u32::from(self.first) + 1) / 2) as usize
    }
}

#[derive(Serialize, Deserialize)]
struct RawRange {
    first: u16,
    last: u16,
}

impl TryFrom<RawRange> for PortRange {
    type Error = PoolError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        PortRange::new(raw.first, raw.last)
    }
}

impl From<PortRange> for RawRange {
    fn from(range: PortRange) -> Self {
        RawRange {
            first: range.first,
            last: range.last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_odd_first_port() {
        assert!(matches!(
            PortRange::new(9001, 9010),
            Err(PoolError::InvalidRange { .. })
        ));
    }

    #[test]
    fn even_last_port_is_not_allocatable() {
        let range = PortRange::new(9000, 9004).unwrap();
        let evens: Vec<u16> = range.evens().collect();

        assert_eq!(evens, vec![9000, 9002]);
        assert_eq!(range.capacity(), 2);
        assert!(!range.contains_pair(9004));
    }

    #[test]
    fn top_of_port_space_does_not_overflow() {
        let range = PortRange::new(65532, 65535).unwrap();
        let evens: Vec<u16> = range.evens().collect();

        assert_eq!(evens, vec![65532, 65534]);
    }
}
