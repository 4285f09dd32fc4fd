//! # Distribution Client
//!
//! Cursor pagination against the remote distribution service.
//!
//! - [`traits`] - the [`DistributionTransport`] seam implemented per wire protocol
//! - [`decoder`] - per-document payload decoding
//! - [`pagination`] - the retrying [`PaginationClient`]

pub mod decoder;
pub mod pagination;
pub mod traits;

pub use decoder::{decode_document, decode_payload, DecodeError};
pub use pagination::{AccessKeyLookup, PaginationClient};
pub use traits::{
    AmbientParams, DistributionQuery, DistributionRequest, DistributionTransport, RawDocument,
    RawPage,
};
