//! bookd — a room-booking service speaking the Postgres wire protocol.
//!
//! Rooms are bookable resources with a capacity, a coarse status
//! (FREE/BOOKED/LOCKED) and a set of non-overlapping half-open booking
//! intervals. Mutations are gated on an administrator identity, persisted
//! to a per-tenant WAL, and broadcast as domain events.

pub mod auth;
pub mod authz;
pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
