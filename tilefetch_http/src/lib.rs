//! HTTP stack for tile fetching: transports behind a replaceable factory,
//! read-through caching keyed by canonical URL, multipart decoding, a
//! decoder registry and the per-worker [`HttpClient`] facade.

pub mod cache;
pub mod client;
pub use client::{ClientEnv, HttpClient};
pub mod decode;
pub mod headers;
pub use headers::Headers;
pub mod hooks;
pub mod multipart;
pub mod request;
pub use request::{HttpRequest, Url};
pub mod response;
pub use response::{HttpResponse, Part};
pub mod result;
pub use result::ReadResult;
pub mod transport;
pub use transport::{Transport, TransportEnv};
