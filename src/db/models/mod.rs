//! Row types and queries for accounts and plushie records.

pub mod plushie;
pub mod user;

pub use plushie::*;
pub use user::*;
