//! # gatehouse-reqwest
//!
//! [`Transport`] implementation for the gatehouse API client on top of
//! [reqwest](https://docs.rs/reqwest) and
//! [reqwest-middleware](https://docs.rs/reqwest-middleware).
//!
//! Any middleware stack built with `reqwest_middleware::ClientBuilder`
//! (tracing, custom headers, ...) can be handed to
//! [`ReqwestTransport::from_middleware`] and keeps working unchanged.
//!
//! ```rust,ignore
//! use gatehouse::{ApiClient, ClientConfig};
//! use gatehouse_reqwest::ReqwestTransport;
//!
//! let transport = ReqwestTransport::new(reqwest::Client::new());
//! let client = ApiClient::new(
//!     transport,
//!     ClientConfig::builder().base_endpoint("https://api.campus.edu").build(),
//! );
//! ```

mod transport;

pub use transport::ReqwestTransport;

pub use gatehouse_core::Transport;
