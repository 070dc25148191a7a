//! Network transport and credential lookup.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`HttpTransport`] | Pooled `reqwest` client that sends [`AdapterRequest`](crate::drivers::AdapterRequest)s |
//! | [`CredentialSource`] | Resolves the API key for a provider |
//! | [`EnvCredentials`] | OS keyring (opt-in) then environment variables |
//! | [`StaticCredentials`] | Fixed keys, for tests and embedding |

pub mod credentials;
pub mod http;

pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use http::{HttpResponse, HttpTransport, TransportError};
