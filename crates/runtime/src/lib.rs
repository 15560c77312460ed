//! Shared runtime services for the HAL drivers
//!
//! - [`ResourceRegistry`] - reference-counted catalog of hardware handles
//! - [`CallbackDispatcher`] - GPIO-interrupt and timer handler tables
//! - [`CancellationToken`] - cooperative stop signal for background threads
//! - [`HalContext`] - bundles the above with the [`HalConfig`](hal_platform::HalConfig)
//! - [`ResourceVisualizer`] - periodic registry and `/proc` snapshots
//!
//! Nothing here is a global. The application builds one [`HalContext`] and
//! clones it into every driver.
//!
//! ```
//! use std::sync::Arc;
//! use hal_platform::PinValue;
//! use hal_runtime::HalContext;
//!
//! let ctx = HalContext::default();
//! ctx.dispatcher.register_gpio_callback(17, Arc::new(|pin, value| {
//!     tracing::info!(pin, value = %value, "edge");
//! }));
//! assert_eq!(ctx.dispatcher.invoke_gpio_callback(17, PinValue::High), 1);
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cancel;
pub mod context;
pub mod dispatch;
pub mod registry;
pub mod visualizer;

pub use cancel::CancellationToken;
pub use context::HalContext;
pub use dispatch::{CallbackDispatcher, CallbackId, TimerId};
pub use registry::{ResourceGuard, ResourceId, ResourceInfo, ResourceKind, ResourceRegistry};
pub use visualizer::{ResourceNode, ResourceUsage, ResourceVisualizer};
