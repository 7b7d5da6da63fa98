//! Structure stages
//!
//! Each stage is a pure function over the reduced bar sequence and the output
//! of the stage before it. All indices are positions in the reduced
//! ([`bars::EquivalentBar`]) sequence unless a field says otherwise.
//!
//! # Stages
//!
//! - **bars**: merge contained/engulfing bars
//! - **fractal**: 3-bar turning points and adjacency compression
//! - **stroke**: alternation and spacing normalization, stroke pairing
//! - **segment**: runs of alternating strokes cut on divergence
//! - **pivot**: overlapping stroke bands with leave confirmation

pub mod helpers;

pub mod bars;
pub mod fractal;
pub mod pivot;
pub mod segment;
pub mod stroke;
