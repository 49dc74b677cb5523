//! Source path translation between a debug client and its debuggee.
//!
//! The client (an IDE) and the debuggee may see the same source tree under
//! different names: another drive, another container, another operating
//! system. This crate translates paths between the two namespaces.
//!
//! - [`PathMapper`] applies an ordered list of [`MappingRule`]s in both
//!   directions. The first matching rule wins.
//! - [`PlatformProfile`] carries the case sensitivity and separator of one side
//!   of the connection. Profiles are explicit values and never derived from
//!   the machine this code runs on.
//! - [`infer_client_os`] derives the client's [`OsFamily`] from the shape of
//!   the configured rules when the client did not say.
//!
//! ```
//! use paths::{MappingRule, PathMapper, PlatformProfile};
//!
//! let mapper = PathMapper::new(
//!     vec![MappingRule::new("C:\\TEMP\\src", "/remote/dir")],
//!     PlatformProfile::WINDOWS,
//!     None,
//! );
//! assert_eq!(mapper.to_remote("c:\\temp\\src\\a.py"), "/remote/dir/a.py");
//! ```

mod error;
mod mapper;
mod os;
mod profile;

pub use error::PathError;
pub use mapper::{AssumeExists, FileProbe, HostFiles, MappingRule, PathMapper};
pub use os::{OsFamily, infer_client_os};
pub use profile::{PlatformProfile, Separator};
