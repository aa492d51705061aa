#![allow(dead_code)]
// Each test binary only uses part of the stubs

pub mod broker;
pub mod config;
pub mod scripts;
pub mod sink;
