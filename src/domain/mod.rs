// Domain layer: payload models and the ports the Google adapters implement.

pub mod model;
pub mod ports;
