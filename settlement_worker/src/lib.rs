//! The settlement worker: consumes the wallet, order-status and notification
//! queues off the central exchange and applies each message to the escrow
//! engine. Also hosts the periodic suspension sweep.

pub mod amqp;
pub mod config;
pub mod consumer;
pub mod consumers;
pub mod errors;
pub mod sinks;
pub mod suspension_worker;
