// Copyright 2025 Oxide Computer Company

//! Integration tests for apicheck.
//!
//! These are all combined into the same file to ensure that a single binary is
//! generated, speeding up link times.

#[macro_use]
extern crate slog;

mod bulk;
mod common;
mod compare;
mod properties;
