// ==============================================================================
// parsers/mod.rs - Input parser modules
// ==============================================================================
// Description: Streaming parsers for compressed variant input
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-12-04
// Version: 2.0.0
// ==============================================================================

pub mod vcf;

pub use vcf::{open_input, InputReader, LineSource, StreamError};
