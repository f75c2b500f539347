//! nsim core - fundamental types for the simulation kernel
//!
//! This crate defines the types shared by every other nsim crate:
//! - Virtual time (Time, TimeUnit) and its fixed-point helper (Int64x64)
//! - Events and event handles (EventImpl, EventId)
//! - Errors

pub mod error;
pub mod event;
pub mod id;
pub mod int64x64;
pub mod time;

pub use error::*;
pub use event::*;
pub use id::*;
pub use int64x64::*;
pub use time::*;
