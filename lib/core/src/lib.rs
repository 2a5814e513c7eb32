//! Core identifier types shared across the medislot workspace.
//!
//! Two identities meet in this platform: the internal [`UserId`] owned by the
//! local user table, and the opaque [`SubjectId`] assigned by the external
//! identity provider.

pub mod id;
pub mod subject;

pub use id::{ParseIdError, UserId};
pub use subject::SubjectId;
