//! Hash-chained transaction bundles
//!
//! Raw transactions are compiled into a backward-linked keccak chain: each
//! transaction carries the commitment hash of its successor, so the hash of
//! the first transaction commits to the entire ordered sequence. The
//! executor contract verifies the same encoding on-chain, which means any
//! tampering or reordering after approval makes execution impossible.

use crate::builder::RawTransaction;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// One chain-linked transaction in the form the executor contract consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledTransaction {
    /// Commitment hash of the transaction that follows this one in
    /// execution order; the zero hash for the last transaction
    pub next_transaction_hash: H256,

    /// Whether this transaction is a contract creation
    pub is_create: bool,

    /// Call target; the zero address for creations
    pub target: Address,

    /// Gas limit the executor forwards to the inner call
    pub gas_limit: U256,

    /// Creation or call data
    pub data: Bytes,
}

impl CompiledTransaction {
    /// Hash committing to this transaction and, through
    /// `next_transaction_hash`, to every transaction after it.
    ///
    /// keccak256 over the ABI encoding of
    /// `(bytes32, bool, address, uint256, bytes)` in field order, exactly
    /// as the executor contract recomputes it.
    pub fn commitment_hash(&self) -> H256 {
        let encoded = abi::encode(&[
            Token::FixedBytes(self.next_transaction_hash.as_bytes().to_vec()),
            Token::Bool(self.is_create),
            Token::Address(self.target),
            Token::Uint(self.gas_limit),
            Token::Bytes(self.data.to_vec()),
        ]);
        H256::from(keccak256(encoded))
    }
}

/// An ordered, chain-linked transaction bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBundle {
    /// Commitment hash of the first transaction; approving it authorizes
    /// the whole sequence. The zero hash for an empty bundle.
    pub hash: H256,

    /// Transactions in execution order
    pub transactions: Vec<CompiledTransaction>,
}

impl TransactionBundle {
    /// Compile raw transactions into a chain-linked bundle.
    ///
    /// The fold runs backwards: the last transaction links to the zero
    /// hash, every earlier transaction links to its successor's commitment
    /// hash, and the head that falls out is the bundle hash.
    pub fn compile(raw: &[RawTransaction]) -> Self {
        let mut next_hash = H256::zero();
        let mut transactions = Vec::with_capacity(raw.len());

        for tx in raw.iter().rev() {
            let compiled = CompiledTransaction {
                next_transaction_hash: next_hash,
                is_create: tx.to.is_none(),
                target: tx.to.unwrap_or_else(Address::zero),
                gas_limit: tx.gas_limit,
                data: tx.data.clone(),
            };
            next_hash = compiled.commitment_hash();
            transactions.push(compiled);
        }

        transactions.reverse();
        Self {
            hash: next_hash,
            transactions,
        }
    }

    /// Recompute every link and check it against the stored chain.
    pub fn verify_chain(&self) -> bool {
        let mut expected = H256::zero();
        for tx in self.transactions.iter().rev() {
            if tx.next_transaction_hash != expected {
                return false;
            }
            expected = tx.commitment_hash();
        }
        self.hash == expected
    }

    /// Index of the transaction whose commitment hash equals `hash`.
    ///
    /// The executor contract stores the hash of the transaction it expects
    /// next, so this maps its on-chain state back to a position in the
    /// bundle when resuming.
    pub fn position_of(&self, hash: H256) -> Option<usize> {
        self.transactions
            .iter()
            .position(|tx| tx.commitment_hash() == hash)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
