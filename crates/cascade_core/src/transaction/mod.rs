//! Join-semantics transaction scope.
//!
//! Only the top-level call of a save or delete opens a scope. If the
//! connection already has an active transaction the scope joins it and
//! neither commits nor rolls back. Nested cascades never touch the
//! transaction at all.

mod scope;

pub use scope::TransactionScope;
