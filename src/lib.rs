// ==============================================================================
// lib.rs - Variant Fan-out Library
// ==============================================================================
// Description: Library interface for the resumable per-sample VCF pipeline
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-12-06
// Version: 2.0.0
// ==============================================================================

pub mod annotation;
pub mod audit;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod filter;
pub mod models;
pub mod output;
pub mod parsers;
pub mod persist;
pub mod processor;
