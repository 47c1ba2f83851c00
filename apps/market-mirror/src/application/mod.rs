//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the book service and the port interfaces that
//! connect the domain to the transport.

/// Port interfaces between transport and book layers.
pub mod ports;

/// Book reconstruction service.
pub mod services;
