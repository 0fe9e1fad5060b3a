//! Identities of the two parties in a sync session.
//!
//! A [`ClientId`] names one requesting connection and is the key the
//! authoritative side files registrations under. A [`WorldId`] names one
//! running world session, so several worlds can share a process. Both are
//! time-ordered UUIDs; they display with a `client:` / `world:` prefix so
//! log lines stay unambiguous, and parse back from either the prefixed or
//! the bare form.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a prefixed identity newtype over [`Uuid`].
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Prefix used by [`Display`](core::fmt::Display) and accepted by
            /// [`FromStr`].
            pub const PREFIX: &'static str = $prefix;

            /// A fresh, time-ordered identity.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// The underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}:{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bare = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .unwrap_or(s);
                Uuid::parse_str(bare).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Identity of a connected client (one per connection).
    ClientId => "client"
}

define_id! {
    /// Identity of one running world session on the authoritative side.
    WorldId => "world"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert_ne!(*a.as_uuid(), Uuid::nil());
    }

    #[test]
    fn serde_uses_the_bare_uuid() {
        let original = WorldId::new();
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, format!("\"{}\"", original.as_uuid()));
        let restored: WorldId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn display_is_prefixed_and_parses_back() {
        let id = ClientId::new();
        let shown = id.to_string();
        assert_eq!(shown, format!("client:{}", id.as_uuid()));
        assert_eq!(shown.parse::<ClientId>().unwrap(), id);
        assert_eq!(id.as_uuid().to_string().parse::<ClientId>().unwrap(), id);
    }

    #[test]
    fn foreign_prefix_is_rejected() {
        let id = WorldId::new();
        assert!(format!("client:{}", id.as_uuid()).parse::<WorldId>().is_err());
    }
}
