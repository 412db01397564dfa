// Integration test suite for roomboard.
//
// Organized into focused modules by surface area. All modules share the
// common::TestApp, which wires the full Rocket app against an in-memory
// coordination store so every test starts from clean state.

mod common;

mod contact;
mod messages;
mod moderation_rules;
mod rate_limits;
mod shadowban;
mod system;
