//! Test helpers para blogcache-server.

#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod client;

pub use assertions::*;
pub use client::{TestApp, TestClient, TestResponse, app, app_with_clock, app_with_posts, entry_uri};
