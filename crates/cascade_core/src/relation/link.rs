//! Key propagation policy between related nodes.

use std::fmt;

/// Which way key values are copied along a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// No copying.
    #[default]
    None,
    /// Parent columns are copied into the child.
    FromParent,
    /// Child columns are copied into the parent.
    FromChild,
    /// Both of the above.
    Both,
}

/// When a copy is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Persistence {
    /// Only when the receiving record is newly created.
    #[default]
    Once,
    /// On every save, existing records included.
    Maintained,
}

/// One of the two relation passes of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Children save before the parent; child keys flow upward.
    FromChild,
    /// Children save after the parent; parent keys flow downward.
    FromParent,
}

/// Link policy of a relation.
///
/// A link type pairs a [`Direction`] with a [`Persistence`] for each
/// direction it covers. Use the associated constants; [`rule`](Self::rule)
/// answers the only question the save passes ask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LinkType {
    direction: Direction,
    from_parent: Persistence,
    from_child: Persistence,
    link_only: bool,
}

impl LinkType {
    /// No link.
    pub const NONE: Self = Self::new(Direction::None, Persistence::Once, Persistence::Once);

    /// The relation is linked by its columns but nothing is copied.
    pub const LINK_ONLY: Self = Self {
        link_only: true,
        ..Self::NONE
    };

    /// Parent keys go into new children.
    pub const FROM_PARENT: Self =
        Self::new(Direction::FromParent, Persistence::Once, Persistence::Once);

    /// Parent keys go into every saved child.
    pub const FROM_PARENT_MAINT: Self = Self::new(
        Direction::FromParent,
        Persistence::Maintained,
        Persistence::Once,
    );

    /// Child keys go into the parent when the child is new.
    pub const FROM_CHILD: Self = Self::new(Direction::FromChild, Persistence::Once, Persistence::Once);

    /// Child keys go into the parent on every save.
    pub const FROM_CHILD_MAINT: Self = Self::new(
        Direction::FromChild,
        Persistence::Once,
        Persistence::Maintained,
    );

    /// Both directions, new records only.
    pub const BI_DIRECT: Self = Self::new(Direction::Both, Persistence::Once, Persistence::Once);

    /// Both directions, every save.
    pub const BI_DIRECT_MAINT: Self = Self::new(
        Direction::Both,
        Persistence::Maintained,
        Persistence::Maintained,
    );

    /// Both directions; parent keys maintained, child keys once.
    pub const BI_DIRECT_MAINT_FROM_PARENT: Self =
        Self::new(Direction::Both, Persistence::Maintained, Persistence::Once);

    /// Both directions; child keys maintained, parent keys once.
    pub const BI_DIRECT_MAINT_FROM_CHILD: Self =
        Self::new(Direction::Both, Persistence::Once, Persistence::Maintained);

    /// Builds a link type from its parts.
    #[must_use]
    pub const fn new(direction: Direction, from_parent: Persistence, from_child: Persistence) -> Self {
        Self {
            direction,
            from_parent,
            from_child,
            link_only: false,
        }
    }

    /// Returns the copy direction.
    #[must_use]
    pub const fn direction(self) -> Direction {
        self.direction
    }

    /// Returns true for [`LINK_ONLY`](Self::LINK_ONLY).
    #[must_use]
    pub const fn is_link_only(self) -> bool {
        self.link_only
    }

    /// Returns how keys are copied during `pass`, or `None` for no copy.
    #[must_use]
    pub const fn rule(self, pass: Pass) -> Option<Persistence> {
        match (self.direction, pass) {
            (Direction::FromParent | Direction::Both, Pass::FromParent) => Some(self.from_parent),
            (Direction::FromChild | Direction::Both, Pass::FromChild) => Some(self.from_child),
            _ => None,
        }
    }

    /// Returns true if `pass` copies keys for a record with the given new flag.
    #[must_use]
    pub fn applies(self, pass: Pass, target_is_new: bool) -> bool {
        match self.rule(pass) {
            Some(Persistence::Maintained) => true,
            Some(Persistence::Once) => target_is_new,
            None => false,
        }
    }

    /// Decodes the numeric constants used by stored relation maps.
    ///
    /// Unknown values disable linking.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::NONE,
            1 => Self::LINK_ONLY,
            2 => Self::FROM_PARENT,
            4 => Self::FROM_CHILD,
            6 => Self::BI_DIRECT,
            10 => Self::FROM_PARENT_MAINT,
            14 => Self::BI_DIRECT_MAINT_FROM_PARENT,
            20 => Self::FROM_CHILD_MAINT,
            22 => Self::BI_DIRECT_MAINT_FROM_CHILD,
            30 => Self::BI_DIRECT_MAINT,
            other => {
                tracing::warn!(bits = other, "unrecognized link type, linking disabled");
                Self::NONE
            }
        }
    }

    /// Encodes this link type as its numeric constant.
    #[must_use]
    pub fn bits(self) -> u8 {
        use Persistence::{Maintained, Once};
        if self.link_only {
            return 1;
        }
        match (self.direction, self.from_parent, self.from_child) {
            (Direction::None, _, _) => 0,
            (Direction::FromParent, Once, _) => 2,
            (Direction::FromParent, Maintained, _) => 10,
            (Direction::FromChild, _, Once) => 4,
            (Direction::FromChild, _, Maintained) => 20,
            (Direction::Both, Once, Once) => 6,
            (Direction::Both, Maintained, Once) => 14,
            (Direction::Both, Once, Maintained) => 22,
            (Direction::Both, Maintained, Maintained) => 30,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.bits() {
            0 => "NONE",
            1 => "LINK_ONLY",
            2 => "FROM_PARENT",
            4 => "FROM_CHILD",
            6 => "BI_DIRECT",
            10 => "FROM_PARENT_MAINT",
            14 => "BI_DIRECT_MAINT_FROM_PARENT",
            20 => "FROM_CHILD_MAINT",
            22 => "BI_DIRECT_MAINT_FROM_CHILD",
            _ => "BI_DIRECT_MAINT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_parent_family() {
        assert_eq!(LinkType::FROM_PARENT.rule(Pass::FromParent), Some(Persistence::Once));
        assert_eq!(LinkType::FROM_PARENT.rule(Pass::FromChild), None);
        assert_eq!(
            LinkType::FROM_PARENT_MAINT.rule(Pass::FromParent),
            Some(Persistence::Maintained)
        );
    }

    #[test]
    fn asymmetric_bidirectional() {
        let lt = LinkType::BI_DIRECT_MAINT_FROM_PARENT;
        assert!(lt.applies(Pass::FromParent, false));
        assert!(!lt.applies(Pass::FromChild, false));
        assert!(lt.applies(Pass::FromChild, true));

        let lt = LinkType::BI_DIRECT_MAINT_FROM_CHILD;
        assert!(!lt.applies(Pass::FromParent, false));
        assert!(lt.applies(Pass::FromChild, false));
    }

    #[test]
    fn none_and_link_only_never_copy() {
        for lt in [LinkType::NONE, LinkType::LINK_ONLY] {
            assert!(!lt.applies(Pass::FromParent, true));
            assert!(!lt.applies(Pass::FromChild, true));
        }
        assert!(LinkType::LINK_ONLY.is_link_only());
        assert_ne!(LinkType::NONE, LinkType::LINK_ONLY);
    }

    #[test]
    fn legacy_constants() {
        for bits in [0u8, 1, 2, 4, 6, 10, 14, 20, 22, 30] {
            assert_eq!(LinkType::from_bits(bits).bits(), bits);
        }
        assert_eq!(LinkType::from_bits(8), LinkType::NONE);
        assert_eq!(LinkType::default(), LinkType::NONE);
    }

    #[test]
    fn display_names() {
        assert_eq!(LinkType::FROM_PARENT_MAINT.to_string(), "FROM_PARENT_MAINT");
        assert_eq!(LinkType::BI_DIRECT_MAINT.to_string(), "BI_DIRECT_MAINT");
    }

    proptest! {
        #[test]
        fn every_bit_pattern_has_one_interpretation(bits in any::<u8>(), is_new in any::<bool>()) {
            let lt = LinkType::from_bits(bits);
            for pass in [Pass::FromParent, Pass::FromChild] {
                let applies = lt.applies(pass, is_new);
                if lt.rule(pass).is_none() {
                    prop_assert!(!applies);
                }
                if is_new && lt.rule(pass).is_some() {
                    prop_assert!(applies);
                }
            }
        }
    }
}
