//! Module for primitive structs shared by the coins views

use std::fmt;

/// The shielded pools tracked by the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShieldedType {
    /// Joinsplit based pool.
    Sprout,
    /// Sapling pool.
    Sapling,
}

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wrap raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn to_bytes(&self) -> [u8; 32] {
                self.0
            }
        }

        impl AsRef<[u8; 32]> for $name {
            fn as_ref(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut bytes = self.0;
                bytes.reverse();
                f.write_str(&hex::encode(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

hash_newtype!(
    /// A revealed nullifier of either shielded pool.
    Nullifier
);
hash_newtype!(
    /// Root of a note commitment tree.
    Anchor
);
