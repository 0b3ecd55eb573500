//! Small pieces of infrastructure shared by more than one counting engine.

pub mod random;
