//! Lightkeeper: lifecycle and chain sync for an embedded Lightning node.
//!
//! # Architecture
//!
//! ```text
//! NodeLifecycle (entry point)
//!   │
//!   ├── WalletSeed ── keychain (SecureStorage, verified writes)
//!   │     ├── LightningAccount (BIP85 child seed)
//!   │     └── ReceiveAddresses (BIP44/49/84, monotonic index)
//!   │
//!   ├── ChainWatcher ── ChainBackend (Electrum)
//!   │     └── headers / script activity ──▶ keep-synced loop
//!   │
//!   ├── LightningNode (external engine, driven through ChainBridge)
//!   │     └── NodeEvent stream ──▶ EventDispatcher ──▶ Notification
//!   │
//!   └── StateStore (channels, invoices, payments, custom peers)
//!
//! PaymentRouter: raw input ─▶ Decision (send / enter amount / peer / LNURL)
//! ```
//!
//! # Features
//!
//! - `electrum` - Electrum chain backend (bdk_electrum + rustls)
//! - `lnurl` - HTTP client for LNURL withdraw/pay
//!
//! # Usage
//!
//! ```ignore
//! use lightkeeper::{NodeConfig, NodeLifecycle, Network};
//!
//! let lifecycle = NodeLifecycle::new(NodeConfig::new(Network::Signet), deps)?;
//! let node_id = lifecycle.setup().await?;
//! lifecycle.keep_synced(lifecycle.config().sync_frequency).await?;
//! ```

pub mod chain;
pub mod error;
pub mod events;
pub mod keys;
pub mod logging;
pub mod node;
pub mod payment;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod types;

pub use chain::{ChainBackend, ChainWatcher, FeeEstimates, TransactionData};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventDispatcher, NodeEvent, Notification};
pub use keys::{AddressType, ReceiveAddresses, WalletSeed};
pub use node::{LifecycleDeps, LightningNode, NodeConfig, NodeLifecycle, NodeState, UserConfig};
pub use payment::{Decision, PaymentRouter};
pub use state::{MemoryStore, StateStore};
pub use storage::{SecureStorage, VerifiedStorage};
pub use types::{Channel, ChannelState, ElectrumPeer, Header, Invoice, LightningPeer, Network, Payment};
