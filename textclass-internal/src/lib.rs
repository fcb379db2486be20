pub mod classification; // request/response types and score post-processing
pub mod config_parser; // gateway config file
pub mod endpoints; // API endpoints
pub mod error; // error handling
pub mod gateway_util; // utilities for gateway
pub mod inference; // classifier construction and providers
pub mod observability; // utilities for observability (logs)
mod testing;

pub mod built_info {
    #![expect(clippy::allow_attributes)]
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
