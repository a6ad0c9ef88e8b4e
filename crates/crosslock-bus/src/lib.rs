//! crosslock-bus
//!
//! Settlement bus plumbing: subject naming, typed request/status/chain-event
//! payloads, the `SettlementSink` interface the engine and coordinator
//! publish through, an in-process broadcast bus for devnet and tests, and a
//! reconnecting TCP client for an external bus.

pub mod bus;
pub mod events;

pub use bus::{BusMessage, DisabledSink, InProcessBus, SettlementSink, TcpBusClient};
pub use events::{
    chain_subject, request_subject, status_subject, ChainEvent, ChainEventKind,
    SettlementRequest, SettlementUpdate, SwapSide,
};
