// Domain layer: remote-order and table models plus the ports the adapters implement.

pub mod model;
pub mod ports;
