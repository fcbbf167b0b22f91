//! Authorization records for paired consoles.

mod store;

pub use store::{AuthStoreError, AuthorizationRecord, AuthorizationStore};
