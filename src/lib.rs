#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

#[cfg(test)]
mod test;

pub mod device;
pub mod event;
pub mod filter;
mod io_return;
mod port;
mod raw;
pub mod registry;
#[cfg(feature = "serde")]
mod serde;

#[doc(inline)]
pub use device::{DeviceIterator, PathIterator, SearchOptions, Service, resolve_path};
#[doc(inline)]
pub use event::{Binding, EventKind, Flavor};
#[doc(inline)]
pub use filter::MatchFilter;
pub use io_return::IoReturn;
pub use port::{Handlers, NotificationPort, RegistrationError};
#[doc(inline)]
pub use registry::SystemRegistry;
#[cfg(target_os = "macos")]
#[doc(inline)]
pub use registry::{RunLoopSource, run_current_run_loop};
