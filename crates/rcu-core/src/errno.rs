//! POSIX-style error numbers used at the caller contract boundary.
//!
//! `add`, `steal`, and `delete` report duplicate/missing keys through the
//! typed error enums in [`crate::ht`], which expose an `as_errno` method
//! built on top of `EEXIST`/`ENOENT` below rather than panicking. `EINVAL`
//! and `EAGAIN` are carried for the same caller-contract surface but have
//! no current call site in this crate.

/// Operation would create a duplicate key.
pub const EEXIST: i32 = 17;
/// No such key.
pub const ENOENT: i32 = 2;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Resource temporarily unavailable (registry/queue full).
pub const EAGAIN: i32 = 11;
