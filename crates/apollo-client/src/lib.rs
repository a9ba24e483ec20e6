#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Client-side protocol for the Apollo configuration service.
//!
//! Layout:
//! - `address`: base URL parsing into scheme, host, port, and path with query.
//! - `signer`: HMAC-SHA1 `Authorization`/`Timestamp` headers.
//! - `transport`: signed GETs over TLS-policy-keyed connection pools.
//! - `configs`: cached and non-cached configuration retrieval.
//! - `notification`: multi-namespace long-poll change watch.
//! - `session`: validated, probed session tying the pieces together.
//! - `config`: session settings, including environment loading.
//! - `probe`: construction-time reachability check and outbound-IP discovery.

pub mod address;
pub mod config;
pub mod configs;
pub mod error;
pub mod notification;
pub mod probe;
pub mod session;
pub mod signer;
pub mod transport;

pub use address::{Scheme, ServiceAddress};
pub use config::{ConfigEnvError, SessionConfig};
pub use configs::{
    ConfigFetch, ConfigParams, ConfigQuery, ConfigurationSet, FetchMode, NotificationMessages,
};
pub use error::{ClientError, ClientResult};
pub use notification::{Notification, UNOBSERVED_NOTIFICATION_ID, WatchSet};
pub use probe::OutboundIpCache;
pub use session::ClientSession;
pub use transport::{HttpTransport, RequestOutcome, TlsPolicy, Transport, TransportRequest};
