/// Declarative macro defining a UUIDv7-backed identifier newtype.
///
/// Generates:
/// - a newtype struct wrapping `Uuid`
/// - `derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)`
/// - `new()`: generates a fresh UUIDv7
/// - `from_uuid()`: reconstructs from an existing UUID (e.g. loaded from storage)
/// - `as_uuid()`: borrows the inner UUID
/// - a `Default` impl delegating to `new()`
///
/// UUIDv7 is used throughout (rather than v4) because it is time-sortable,
/// which keeps index locality reasonable for the append-heavy tables this
/// workspace's identifiers back (workflow entity states, relationship
/// candidates).
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            /// Generate a new identifier (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Reconstruct an identifier from a UUID already on hand.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the inner UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

pub(crate) use define_uuid_id;
