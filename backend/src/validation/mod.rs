//! Field rules shared by request payloads and the permission registry.

pub mod rules;
