//! Declarative builder for HTTP API clients.
//!
//! Describe routes (path templates, verbs, query and body shapes,
//! expected status codes, streaming modes) on a [`ClientBuilder`]; each
//! declaration compiles into an in-memory request pipeline invoked by
//! name through [`Client::call`]. Nested sections inherit and override
//! parent configuration, and transient transport failures retry under a
//! bounded [`RetryPolicy`].
//!
//! ```no_run
//! use routebind::{CallArgs, Client, RouteSpec};
//! use serde_json::json;
//!
//! # async fn demo() -> routebind::Result<()> {
//! let client = Client::builder("example")
//!     .base_url("https://api.example.com")?
//!     .header("Content-Type", "application/json")
//!     .route(RouteSpec::new("get_user", "/users/:id").query(json!({"app_id": ":app_id"})))?
//!     .route(RouteSpec::new("create_user", "/users").expect_status(201))?
//!     .build()?;
//!
//! let user = client
//!     .call("get_user", CallArgs::new().arg("id", 7).arg("app_id", "web"))
//!     .await?
//!     .decoded();
//!
//! let created = client
//!     .call("create_user", CallArgs::new().body_arg(json!({"name": "Ada"})))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod query;
pub mod retry;
pub mod route;
pub mod section;
pub mod template;
pub mod transport;
pub mod value;

pub use client::{Client, ClientBuilder, Provider};
pub use config::{BodyEncoding, ClientConfig, QueryEncoding};
pub use error::{Error, Result};
pub use executor::{CallArgs, Reply, StreamSink};
pub use query::QueryEncoder;
pub use retry::RetryPolicy;
pub use route::{CompiledRoute, ResponseHook, ReturnMode, RouteSpec, StreamMode};
pub use section::Section;
pub use transport::{
    HttpTransport, Response, ResponseHead, Transport, TransportError, TransportErrorKind,
    TransportRequest,
};
pub use value::ValueSource;
