//! Operations portal back-end.
//!
//! ## Overview
//!
//! Staff manage partners, campaigns, the service catalog, packages,
//! permission defaults, task templates and versioned notes through a JSON
//! API. An authenticating proxy in front of the portal supplies the caller's
//! identity and permission list as request headers.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Proxy   │ ───────> │  server.rs  (Router, CORS, TraceLayer)           │
//! │ (auth'd) │ <─────── │    └─ api/auth.rs  (route gate, Actor)           │
//! └──────────┘          │    └─ api/*.rs     (handlers per area, ApiError) │
//!                       │         │                                        │
//!                       │         │ DbHandle::call() on spawn_blocking     │
//!                       │         v                                        │
//!                       │  db/*.rs  (PortalDb over rusqlite, migrations)   │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  models.rs  (rows, forms, patches)               │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! Partner, campaign, package and template writes append to the activity
//! log on the same connection as the write they describe.

pub mod api;
pub mod db;
pub mod models;
pub mod server;
