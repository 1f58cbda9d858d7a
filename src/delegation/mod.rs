//! Asynchronous request/reply delegation between the central side and the cloud
//! worker.

mod bus;
mod client;
mod messages;
pub mod worker;

pub use bus::MessageBus;
pub use client::{DelegationClient, TransportError};
pub use messages::{channels, DelegatedRequest, Envelope, Failure, Replier, Reply, PONG};
pub use worker::{CloudWorker, Provisioner, SimulatedProvisioner};
