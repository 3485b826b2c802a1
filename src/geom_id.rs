//! Geometry identifiers.
//!
//! A [`GeomId`] is a category type plus an ordered list of sub-addresses. Its
//! textual form is `[type:a.b.c]`, with `?` standing for an unset type or
//! address and `*` for the wildcard address.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GeomError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trip() {
        let mut gid = GeomId::new(310, &[1, 4, 2]);
        gid.set_any(1);
        let text = gid.to_string();
        assert_eq!(text, "[310:1.*.2]");
        assert_eq!(text.parse::<GeomId>().unwrap(), gid);

        let unset = GeomId::make(GeomId::INVALID_TYPE, 2);
        assert_eq!(unset.to_string(), "[?:?.?]");
        assert_eq!("[?:?.?]".parse::<GeomId>().unwrap(), unset);
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "0:1", "[0;1]", "[0:1.]", "[x:1]", "[0:1.2", "[0:-1]"] {
            assert!(bad.parse::<GeomId>().is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn validity_and_completeness() {
        let mut gid = GeomId::make(1000, 2);
        assert!(!gid.is_valid());
        gid.set(0, 3);
        assert!(!gid.is_valid());
        gid.set_any(1);
        assert!(gid.is_valid());
        assert!(!gid.is_complete());
        gid.set(1, 0);
        assert!(gid.is_complete());

        assert!(!GeomId::make(1000, 0).is_valid());
        assert!(!GeomId::new(GeomId::INVALID_TYPE, &[0]).is_valid());
    }

    #[test]
    fn ordering_is_type_then_addresses() {
        let mut ids = vec![
            GeomId::new(2, &[0]),
            GeomId::new(1, &[3, 1]),
            GeomId::new(1, &[3]),
            GeomId::new(1, &[2, 9]),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                GeomId::new(1, &[2, 9]),
                GeomId::new(1, &[3]),
                GeomId::new(1, &[3, 1]),
                GeomId::new(2, &[0]),
            ]
        );
    }

    #[test]
    fn wildcard_matching() {
        let mut pattern = GeomId::new(5, &[1, 0]);
        pattern.set_any(1);
        assert!(pattern.matches(&GeomId::new(5, &[1, 7])));
        assert!(!pattern.matches(&GeomId::new(5, &[2, 7])));
        assert!(!pattern.matches(&GeomId::new(6, &[1, 7])));
        assert!(!pattern.matches(&GeomId::new(5, &[1])));
    }

    #[test]
    fn inherit_and_extract() {
        let mother = GeomId::new(100, &[4]);
        let mut child = GeomId::make(110, 2);
        child.inherits_from(&mother).unwrap();
        child.set(1, 7);
        assert_eq!(child, GeomId::new(110, &[4, 7]));

        let mut back = GeomId::make(100, 1);
        child.extract_to(&mut back).unwrap();
        assert_eq!(back, mother);

        let mut too_short = GeomId::make(1, 0);
        assert!(too_short.inherits_from(&child).is_err());
    }
}

/// A geometry identifier: a category type and its sub-addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeomId {
    type_id: u32,
    addresses: Vec<u32>,
}

impl GeomId {
    pub const INVALID_TYPE: u32 = u32::MAX;
    pub const INVALID_ADDRESS: u32 = u32::MAX;
    pub const ANY_ADDRESS: u32 = u32::MAX - 1;
    /// Type conventionally reserved for the world category.
    pub const WORLD_TYPE: u32 = 0;

    /// Creates an identifier with explicit addresses.
    pub fn new(type_id: u32, addresses: &[u32]) -> Self {
        Self {
            type_id,
            addresses: addresses.to_vec(),
        }
    }

    /// Creates an identifier of the given depth with every address unset.
    pub fn make(type_id: u32, depth: usize) -> Self {
        Self {
            type_id,
            addresses: vec![Self::INVALID_ADDRESS; depth],
        }
    }

    /// An identifier with no type and no address.
    pub fn invalid() -> Self {
        Self::make(Self::INVALID_TYPE, 0)
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn depth(&self) -> usize {
        self.addresses.len()
    }

    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.addresses.get(index).copied()
    }

    /// Sets the address at `index`, growing the identifier with unset
    /// addresses when needed.
    pub fn set(&mut self, index: usize, value: u32) {
        if index >= self.addresses.len() {
            self.addresses.resize(index + 1, Self::INVALID_ADDRESS);
        }
        self.addresses[index] = value;
    }

    pub fn set_any(&mut self, index: usize) {
        self.set(index, Self::ANY_ADDRESS);
    }

    pub fn is_any(&self, index: usize) -> bool {
        self.get(index) == Some(Self::ANY_ADDRESS)
    }

    pub fn is_invalid(&self, index: usize) -> bool {
        self.get(index).map_or(true, |a| a == Self::INVALID_ADDRESS)
    }

    pub fn reset_addresses(&mut self) {
        self.addresses.fill(Self::INVALID_ADDRESS);
    }

    /// True when the type is set and every address is either concrete or the
    /// wildcard.
    pub fn is_valid(&self) -> bool {
        self.type_id != Self::INVALID_TYPE
            && !self.addresses.is_empty()
            && self.addresses.iter().all(|&a| a != Self::INVALID_ADDRESS)
    }

    /// True when valid and free of wildcards.
    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.addresses.iter().all(|&a| a != Self::ANY_ADDRESS)
    }

    /// Copies the addresses of `source` into the leading slots of `self`.
    pub fn inherits_from(&mut self, source: &GeomId) -> Result<()> {
        if self.depth() < source.depth() {
            return Err(GeomError::Schema(format!(
                "cannot inherit {} into {}: incompatible address depth",
                source, self
            )));
        }
        self.addresses[..source.depth()].copy_from_slice(&source.addresses);
        Ok(())
    }

    /// Copies the leading addresses of `self` into every slot of `target`.
    pub fn extract_to(&self, target: &mut GeomId) -> Result<()> {
        if self.depth() < target.depth() {
            return Err(GeomError::Schema(format!(
                "cannot extract {} from {}: incompatible address depth",
                target, self
            )));
        }
        let depth = target.depth();
        target.addresses.copy_from_slice(&self.addresses[..depth]);
        Ok(())
    }

    /// Wildcard-aware comparison: the wildcard on either side matches any
    /// concrete address, an unset address matches nothing.
    pub fn matches(&self, other: &GeomId) -> bool {
        if self.type_id != other.type_id || self.depth() != other.depth() {
            return false;
        }
        self.addresses
            .iter()
            .zip(other.addresses.iter())
            .all(|(&a, &b)| {
                if a == Self::INVALID_ADDRESS || b == Self::INVALID_ADDRESS {
                    return false;
                }
                a == b || a == Self::ANY_ADDRESS || b == Self::ANY_ADDRESS
            })
    }
}

impl Default for GeomId {
    fn default() -> Self {
        Self::invalid()
    }
}

impl PartialOrd for GeomId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GeomId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id
            .cmp(&other.type_id)
            .then_with(|| self.addresses.cmp(&other.addresses))
    }
}

impl fmt::Display for GeomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if self.type_id == Self::INVALID_TYPE {
            write!(f, "?")?;
        } else {
            write!(f, "{}", self.type_id)?;
        }
        write!(f, ":")?;
        for (i, &address) in self.addresses.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match address {
                Self::INVALID_ADDRESS => write!(f, "?")?,
                Self::ANY_ADDRESS => write!(f, "*")?,
                a => write!(f, "{}", a)?,
            }
        }
        write!(f, "]")
    }
}

impl FromStr for GeomId {
    type Err = GeomError;

    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| GeomError::syntax(s, "expected '[type:addresses]'"))?;
        let (type_token, address_token) = inner
            .split_once(':')
            .ok_or_else(|| GeomError::syntax(s, "missing ':' separator"))?;

        let type_id = match type_token {
            "?" => Self::INVALID_TYPE,
            t => t
                .parse::<u32>()
                .map_err(|_| GeomError::syntax(s, format!("invalid type '{}'", t)))?,
        };

        let mut addresses = Vec::new();
        if !address_token.is_empty() {
            for token in address_token.split('.') {
                let address = match token {
                    "?" => Self::INVALID_ADDRESS,
                    "*" => Self::ANY_ADDRESS,
                    a => a
                        .parse::<u32>()
                        .map_err(|_| GeomError::syntax(s, format!("invalid address '{}'", a)))?,
                };
                addresses.push(address);
            }
        }

        Ok(Self { type_id, addresses })
    }
}

impl Serialize for GeomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GeomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
