use core::fmt;
use core::num::NonZeroU32;
use core::str::FromStr;

use crate::error::CoreError;

/// Compact, stable identifier used for element and controller handles.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }

    /// Recover the 0-based index as a `usize` for slice access.
    pub fn slot(self) -> usize {
        self.index() as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Handle onto an element owned by a circuit model.
pub type ElementHandle = Id;
/// Handle onto a controller owned by a controller registry.
pub type ControllerId = Id;
/// Handle onto a bus of a circuit model.
pub type BusId = Id;

/// Identity of a circuit element: `(class, name)`.
///
/// Circuit element names are case-insensitive, so both parts are stored
/// lower-cased. The textual form is `class.name`, e.g. `load.motor1`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementId {
    class: String,
    name: String,
}

impl ElementId {
    pub fn new(class: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            class: class.as_ref().trim().to_ascii_lowercase(),
            name: name.as_ref().trim().to_ascii_lowercase(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this element belongs to `class` (case-insensitive).
    pub fn is_class(&self, class: &str) -> bool {
        self.class.eq_ignore_ascii_case(class)
    }
}

impl FromStr for ElementId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((class, name)) if !class.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Self::new(class, name))
            }
            _ => Err(CoreError::InvalidElementName {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({}.{})", self.class, self.name)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_u32, 1, 2, 42, 10_000] {
            let id = Id::from_index(i);
            assert_eq!(id.index(), i);
            assert_eq!(id.slot(), i as usize);
        }
    }

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<Id>(),
            core::mem::size_of::<Option<Id>>()
        );
    }

    #[test]
    fn element_id_is_case_insensitive() {
        let a: ElementId = "Load.Motor1".parse().unwrap();
        let b = ElementId::new("load", "MOTOR1");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "load.motor1");
        assert!(a.is_class("LOAD"));
    }

    #[test]
    fn element_id_rejects_missing_class() {
        assert!("motor1".parse::<ElementId>().is_err());
        assert!(".motor1".parse::<ElementId>().is_err());
        assert!("Load.".parse::<ElementId>().is_err());
    }

    #[test]
    fn element_id_keeps_dots_in_name() {
        let id: ElementId = "Line.feeder.seg1".parse().unwrap();
        assert_eq!(id.class(), "line");
        assert_eq!(id.name(), "feeder.seg1");
    }
}
