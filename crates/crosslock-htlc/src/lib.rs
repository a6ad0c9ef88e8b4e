//! crosslock-htlc
//!
//! Chain adapters for the two legs of a swap.
//!
//! UTXO side: redeem-script construction, P2SH address derivation, legacy
//! transaction serialization and sighash, and the lock/claim/refund builders.
//! Claims and refunds are assembled by hand because no stock wallet will sign
//! the custom scriptSig that reveals the preimage.
//!
//! Contract side: the `ContractHtlc` interface over a deployed hash-keyed
//! HTLC contract, with a JSON-RPC adapter and an in-memory reference
//! implementation for devnet runs and tests.

pub mod builder;
pub mod contract;
pub mod rpc;
pub mod script;
pub mod tx;

pub use builder::{build_claim_tx, build_lock_tx, build_refund_tx, decode_wif, BuilderError, Utxo};
pub use contract::{ContractError, ContractHtlc, HtlcRecord, MemoryContractHtlc, RpcContractHtlc};
pub use rpc::{RpcError, UnspentOutput, UtxoRpc};
pub use script::{
    htlc_redeem_script, p2pkh_script_pubkey, p2sh_address, p2sh_script_pubkey, ScriptBuilder,
};
pub use tx::{OutPoint, Transaction, TxError, TxIn, TxOut, SIGHASH_ALL};
