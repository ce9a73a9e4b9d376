//! Session runtime for umbra.
//!
//! Everything the orchestrator composes lives here: the backend contract,
//! the static driver registry and capability resolver, the capability
//! matcher, the session and pending-driver registries, shutdown signalling
//! and the error taxonomy. The reference [`FakeDriver`] backend is included
//! so the whole stack can run without a device.

pub mod build_info;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
pub mod matcher;
pub mod registry;
pub mod resolver;
pub mod sessions;
pub mod shutdown;

pub use build_info::BuildInfo;
pub use config::{ReadPolicy, SecurityPolicy, ServerArgs};
pub use driver::{BackendResult, CreateSessionArgs, Driver, DriverData, DriverFactory, ProxyRoute};
pub use error::{BackendError, Error, ResolutionFailure, Result};
pub use fake::{FakeDriver, FakeDriverFactory};
pub use matcher::{CapabilityMatcher, MatchError, ParsedCapabilities, StandardMatcher};
pub use registry::{DriverDescriptor, DriverRegistry, Lookup, Platform, automation};
pub use resolver::{ResolutionNotice, ResolvedDriver, resolve_driver};
pub use sessions::{PendingRegistry, PendingTicket, SessionEntry, SessionRegistry};
pub use shutdown::{ShutdownCallback, ShutdownEvent, ShutdownNotifier, ShutdownSignal};
