//! Strongly-typed IDs used across symgraph.
//!
//! These are `#[repr(transparent)]` newtypes around `u32` to keep them cheap
//! and type-safe. Raw value 0 is reserved as "none" for both id spaces.

macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Copy,
            Clone,
            Default,
            Eq,
            PartialEq,
            Hash,
            Ord,
            PartialOrd,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: $name = $name(0);

            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self::from_raw(raw)
            }

            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn to_raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(FileId);
define_id!(BuildRootId);
