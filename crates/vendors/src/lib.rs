//! Vendor adapters: the translation layer between heterogeneous civic-tech
//! platforms and the normalized meeting model.
//!
//! Each vendor module implements [`adapter::VendorAdapter`] over the shared
//! [`adapter::AdapterCore`] (HTTP + parsing helpers). Adapters are built per
//! sync attempt via [`factory::build_adapter`] and discarded afterwards; the
//! [`session::SessionPool`] and [`rate_limit::VendorRateLimiter`] they borrow
//! live for the whole process.

pub mod adapter;
pub mod adapters;
pub mod dates;
pub mod discovery;
pub mod error;
pub mod factory;
pub mod filters;
pub mod matter_files;
pub mod parsers;
pub mod participation;
pub mod pdf;
pub mod rate_limit;
pub mod roster;
pub mod session;
pub mod sites;

pub use adapter::{
    AdapterCore, AttachmentRecord, FetchResult, ItemRecord, MeetingRecord, VendorAdapter,
};
pub use error::VendorError;
pub use factory::{build_adapter, AdapterDeps};
pub use rate_limit::VendorRateLimiter;
pub use session::SessionPool;
