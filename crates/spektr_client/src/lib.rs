//! Fluent HTTP test client for Spektr.
//!
//! Each call declares its expectations up front, performs the request and
//! fails with [`ClientError::ExpectationFailed`] listing everything that
//! did not hold.

pub mod client;
pub mod errors;
pub mod expectations;

pub use client::{spektr_client, ExchangeResult, SpektrTestClient};
pub use errors::{ClientError, ClientResult};
pub use expectations::{
    ExpectationSpec, JsonPathAssertion, JsonPathCheck, JsonPathExpectation, RequestSpec,
    StatusExpectation,
};
