//! Shared metric model and retry machinery used by both the agent and the
//! server.

pub mod convert;
pub mod model;
pub mod retry;

pub mod proto {
    #![allow(clippy::pedantic)]
    #![allow(clippy::missing_errors_doc)]
    #![allow(clippy::doc_markdown)]
    #![allow(clippy::default_trait_access)]
    tonic::include_proto!("vitals");
}
