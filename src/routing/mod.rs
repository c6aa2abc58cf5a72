//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup):
//!     template → pattern.rs (compile, priority)
//!     → table.rs (insert, stable sort by priority)
//!     → named.rs (optional reverse-lookup name)
//!
//! Lookup (per request):
//!     method + path → table.rs (scan in priority order)
//!     → first matching Route + extracted Params, or None
//! ```
//!
//! # Design Decisions
//! - Specificity decides, not registration order: static 0, +10 per
//!   parameter, +20 per wildcard; lower wins
//! - Ties keep registration order
//! - No regex; segment comparison only

pub mod group;
pub mod named;
pub mod pattern;
pub mod route;
pub mod table;

pub use group::{join_paths, Group};
pub use named::{NamedRoutes, UrlError};
pub use pattern::{Params, Pattern, PatternError};
pub use route::{LayoutSelection, Route, RouteHandle, RouteInfo, RouteMeta};
pub use table::{RouteId, RouteTable};
