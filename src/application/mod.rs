//! Request-time services: language negotiation, page lookup, redirects and
//! the pipeline tying them to the response cache.

pub mod error;
pub mod languages;
pub mod page;
pub mod pipeline;
pub mod publish;
pub mod redirect;
pub mod repos;
pub mod site;
