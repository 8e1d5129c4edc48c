// Copyright 2025 Oxide Computer Company

//! Integration tests for the standard rulesets.
//!
//! These are all combined into the same file to ensure that a single binary is
//! generated, speeding up link times.

mod scenarios;
