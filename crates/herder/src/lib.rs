//! Consensus driving for a corral node.
//!
//! The Herder is the coordinator between the FBA protocol engine and the
//! rest of the node. It:
//!
//! - decides when to propose a new ledger and what to propose,
//! - applies local policy to every value and ballot the engine sees,
//! - orchestrates fetching of referenced content (transaction sets,
//!   quorum sets) and gates validation on its arrival,
//! - holds candidate transactions across generations until they make it
//!   into a ledger,
//! - reacts to externalization by handing the agreed set to the ledger
//!   and scheduling the next trigger.
//!
//! ```text
//! +------------------+
//! |      Herder      |
//! |------------------|
//! | - mempool        |  <-- Mempool (four generations)
//! | - fetchers       |  <-- ItemFetcher / TxSetFetcherPair
//! | - gates          |  <-- FetchGate (hash-keyed waiters)
//! | - timers         |  <-- TimerManager (trigger / bump / ballot)
//! +------------------+
//!     |           |
//!     v           v
//! FbaKernel   LedgerGateway / OverlayGateway
//! ```
//!
//! All state is owned by the Herder and protected for shared access; the
//! kernel, ledger and overlay are reached through non-owning handles.

mod config;
mod error;
mod fetch_gate;
mod gateway;
mod herder;
mod item_fetcher;
mod mempool;
mod state;
mod timers;
mod tx_set;
mod validation;

pub use config::HerderConfig;
pub use error::HerderError;
pub use fetch_gate::{Continuation, FetchGate};
pub use gateway::{ItemKind, LedgerGateway, OverlayGateway};
pub use herder::Herder;
pub use item_fetcher::{ItemFetcher, ItemFetcherConfig, TxSetFetcherPair};
pub use mempool::{AdmitResult, Mempool, GENERATION_COUNT};
pub use state::{NodeState, SyncTracker};
pub use timers::{TimerEvents, TimerHandle, TimerManager};
pub use tx_set::TxSetFrame;
pub use validation::{
    ballot_counter_within_rate, compare_consensus_values, is_king, is_trusted, king_digest,
};

/// Result type for Herder operations.
pub type Result<T> = std::result::Result<T, HerderError>;
