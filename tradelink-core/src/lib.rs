//! Bookmark organizer core: categories of links behind a pluggable storage
//! backend, with host-mode gating and a view model derived fresh on every refresh.

pub mod config;
pub mod seed;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;
pub mod view;
