//! Run context: which deployment run, and which attempt at it.

mod identity;

pub use identity::RunIdentity;
