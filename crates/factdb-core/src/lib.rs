//! Core types for the factdb system.
//!
//! This crate contains the value types the rest of the workspace is built
//! on: [`Fact`](fact::Fact), [`Item`](item::Item), the changeset types, and
//! the salt-keyed ref encoding.

pub mod changeset;
pub mod fact;
pub mod item;
pub mod refs;

pub use changeset::{Change, ChangeSet, ChangeSetPayload};
pub use fact::Fact;
pub use item::Item;
pub use refs::RefCoder;
