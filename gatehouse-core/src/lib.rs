#![warn(missing_docs)]
//! # gatehouse-core
//!
//! Core types for the gatehouse API gateway client.
//!
//! This crate holds the **transport-agnostic** vocabulary that the client
//! pipeline in `gatehouse` is built from, and that transport crates
//! (like `gatehouse-reqwest`) implement against.
//!
//! ## Architecture
//!
//! Every call flows through a fixed pipeline. This crate provides the types
//! the pipeline uses to:
//!
//! - **Describe** a call ([`RequestDescriptor`], [`RequestOptions`])
//! - **Identify** a read for caching and deduplication ([`RequestKey`])
//! - **Classify** a call as cached, deduplicated-only or direct ([`RequestPolicy`])
//! - **Send** it over the wire ([`Transport`], [`OutgoingRequest`])
//! - **Decode** what came back ([`TransportResponse`], [`Payload`])
//! - **Report** where a result came from ([`RequestContext`])

pub mod context;
pub mod key;
pub mod policy;
pub mod request;
pub mod response;
pub mod transport;

pub use context::{CacheStatus, RequestContext, ResponseSource};
pub use key::RequestKey;
pub use policy::RequestPolicy;
pub use request::{Method, OutgoingRequest, QueryParams, RequestDescriptor, RequestOptions};
pub use response::{Payload, TransportResponse};
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use transport::{Transport, TransportError};
