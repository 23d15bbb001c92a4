//! Tests for the reef-adder crate.

mod helpers;
