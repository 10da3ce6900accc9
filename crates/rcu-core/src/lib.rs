//! # rcu-core
//!
//! Userspace Read-Copy-Update (RCU) synchronization and an RCU-protected
//! separately-chained hash table.
//!
//! This crate is split into two layers:
//!
//! - [`gp`]: the grace-period detection engine — reader registration,
//!   `read_enter`/`read_exit`, and `synchronize`. Readers pay no atomic
//!   read-modify-write operations; all of the coordination cost is paid by
//!   writers inside `synchronize`.
//! - [`ht`]: a fixed-size, lock-free-for-readers hash table built on top of
//!   the GP engine, exercising `read_enter`/`read_exit` on the read side and
//!   `defer_free`/compare-exchange on the write side.
//!
//! No `unsafe` is permitted at the crate level; individual modules that must
//! dereference raw pointers document their safety contract and opt back in
//! with `#[allow(unsafe_code)]`.

#![deny(unsafe_code)]

pub mod errno;
pub mod gp;
pub mod ht;
mod jhash;

pub use jhash::jhash;
