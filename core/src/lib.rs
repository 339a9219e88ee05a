//! Client kit for the KraftCloud REST API.
//!
//! # Overview
//! Every resource client (instances, volumes, service groups, autoscale,
//! certificates, images, users, metros) is a thin projection of one shared
//! substrate:
//!
//! - `Options` holds the token, default metro, timeout, retry budget and
//!   transport, and is frozen after construction.
//! - `RequestBuilder` resolves `https://api.<metro>.kraft.cloud/v1/<path>`,
//!   attaches the bearer token and sends the request through the effective
//!   `Transport` under a cancellation token and timeout.
//! - `Envelope<T>` decodes the common response wrapper whose `data` object
//!   holds a single, resource-named array of `T`.
//!
//! # Design
//! - Clients are immutable values. `with_metro`, `with_transport` and
//!   `with_timeout` return new clients, so one client can be shared across
//!   tasks without locks.
//! - Batch calls return the whole `Envelope`; `all_or_err` hands back every
//!   item together with an aggregate of per-item failures.
//! - Dispatch never retries. Wrap the transport in `RetryTransport` to opt
//!   in for idempotent verbs.
//!
//! ```no_run
//! use kraftcloud_core::{KraftCloud, ServiceClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), kraftcloud_core::Error> {
//! let kc = KraftCloud::from_env()?;
//! let cancel = CancellationToken::new();
//! let (instances, failures) = kc
//!     .instances()
//!     .with_metro("dal0")
//!     .get(&cancel, ["my-instance"])
//!     .await?
//!     .all_or_err();
//! failures?;
//! println!("{} instances", instances.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod http;
pub mod identifier;
pub mod options;
pub mod request;
pub mod retry;
pub mod services;

pub use client::{KraftCloud, ServiceClient};
pub use envelope::{ApiItem, Envelope, RequestError, ResponseCommon, ResponseStatus};
pub use error::{ApiErrorCode, Error, Result, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use identifier::{is_uuid, Identifier, IdentifierKind};
pub use options::{Options, OptionsBuilder};
pub use request::RequestBuilder;
pub use retry::{RetryPolicy, RetryTransport};
pub use services::images::normalize_image_name;
