//! Wire types for the umbra session protocol.
//!
//! This crate contains the serde-serializable shapes a client sends when it
//! asks for a session and the uniform envelope every public operation
//! answers with:
//!
//! - **Protocol**: the negotiated dialect (W3C or legacy MJSONWP)
//! - **Capabilities**: JSONWP `desiredCapabilities` and W3C
//!   `alwaysMatch`/`firstMatch` payloads, plus the typed view the resolver reads
//! - **Settings**: `settings[...]` keys pulled out of capability payloads
//! - **Envelope**: `{protocol, value | error}` result carrier
//!
//! Types in this crate are pure data. Behavior that needs a runtime lives in
//! `umbra-runtime`.

pub mod capabilities;
pub mod envelope;
pub mod settings;
pub mod types;

pub use capabilities::*;
pub use envelope::*;
pub use settings::*;
pub use types::*;
