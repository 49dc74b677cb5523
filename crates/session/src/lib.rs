//! Source resolution for one debug session.
//!
//! A [`SessionContext`] owns everything that must not outlive a client
//! session: the configured [`paths::PathMapper`], the [`SourceRegistry`] of
//! remote-only files and the cancellation token that ends outstanding work.
//! Request handlers borrow the context and use
//!
//! - [`BreakpointTranslator`] for `setBreakpoints`,
//! - [`FrameSourceResolver`] for the sources of `stackTrace` frames,
//! - [`SourceContentService`] for `source`.
//!
//! The debuggee itself is reached through the traits in [`collaborators`].

pub mod collaborators;
pub mod testing;

mod breakpoints;
mod content;
mod context;
mod error;
mod frames;
mod registry;

pub use breakpoints::{BreakpointTranslator, InstalledBreakpoint};
pub use collaborators::{
    BreakpointInstaller, ConfigurationSink, DebuggeeConnection, VerifiedBreakpoint,
};
pub use content::{DEFAULT_FETCH_TIMEOUT, SourceContentService};
pub use context::{ProbeMode, SessionConfig, SessionContext};
pub use error::{SOURCE_UNAVAILABLE, SessionError, SourceError};
pub use frames::{FrameSourceResolver, SourceDescriptor};
pub use registry::{SourceReference, SourceRegistry};
