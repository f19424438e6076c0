// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of the pure planning functions that must hold for every
//! valid parent block.

mod address_planning;
