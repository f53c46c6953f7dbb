//! Minimal Solidity ABI encoding for the vault's fixed call set.
//!
//! Only static `address`/`uint` arguments and `uint`/`bool` return words are
//! needed, plus one dynamic `uint256[]` return.

use crate::domain::{Address, Decimal, RiskTier, TOKEN_DECIMALS};
use thiserror::Error;

pub type Selector = [u8; 4];
pub type Word = [u8; 32];

// Core vault.
pub const GET_USER_POSITION: Selector = [0x5b, 0x7c, 0x2d, 0xad];
pub const GET_VAULT_METRICS: Selector = [0xff, 0x6a, 0xdf, 0xa4];
pub const DEPOSIT: Selector = [0x0d, 0x88, 0x82, 0xb2];
pub const DEPOSIT_NATIVE: Selector = [0x22, 0xf1, 0x14, 0x86];
pub const REQUEST_WITHDRAWAL: Selector = [0xdb, 0xaf, 0x21, 0x45];
pub const CLAIM_EPOCH_REWARD: Selector = [0x0a, 0x71, 0xe7, 0x34];
pub const UPDATE_RISK_LEVEL: Selector = [0x53, 0xcb, 0x83, 0x2d];

// Vault extension.
pub const GET_CURRENT_EPOCH_STATUS: Selector = [0x46, 0x66, 0xa6, 0x2b];
pub const GET_USER_DEPOSIT: Selector = [0xc0, 0x84, 0xb1, 0x0b];
pub const GET_CLAIMABLE_EPOCHS: Selector = [0xeb, 0x87, 0xa6, 0xf7];
pub const CALCULATE_REWARD_PARAMETERS: Selector = [0xd7, 0x90, 0xdf, 0x2c];
pub const IS_ELIGIBLE_FOR_EPOCH: Selector = [0x5d, 0xc8, 0xac, 0xce];
pub const HAS_CLAIMED_EPOCH: Selector = [0x13, 0xdb, 0x15, 0xc2];

// ERC-20.
pub const APPROVE: Selector = [0x09, 0x5e, 0xa7, 0xb3];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("return data is not hex: {0}")]
    InvalidHex(String),
    #[error("return data length {0} is not a multiple of 32 bytes")]
    Misaligned(usize),
    #[error("expected at least {expected} words, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("word {index} does not fit {target}")]
    OutOfRange { index: usize, target: &'static str },
    #[error("word {index} is not a bool")]
    InvalidBool { index: usize },
    #[error("word {index} is not a risk tier")]
    InvalidRiskTier { index: usize },
    #[error("invalid address argument: {0}")]
    InvalidAddress(String),
}

/// A static call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
}

/// `0x`-prefixed calldata for `selector(args...)`.
pub fn encode_call(selector: Selector, args: &[Token]) -> Result<String, AbiError> {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector);
    for arg in args {
        let mut word = [0u8; 32];
        match arg {
            Token::Address(addr) => {
                let bytes = addr
                    .to_bytes()
                    .map_err(|e| AbiError::InvalidAddress(e.to_string()))?;
                word[12..].copy_from_slice(&bytes);
            }
            Token::Uint(value) => {
                word[16..].copy_from_slice(&value.to_be_bytes());
            }
        }
        data.extend_from_slice(&word);
    }
    Ok(format!("0x{}", hex::encode(data)))
}

/// Split `0x`-prefixed return data into 32-byte words.
pub fn decode_words(data: &str) -> Result<Vec<Word>, AbiError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(digits).map_err(|_| AbiError::InvalidHex(data.to_string()))?;
    if bytes.len() % 32 != 0 {
        return Err(AbiError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Typed access to a decoded return tuple.
#[derive(Debug)]
pub struct Words {
    words: Vec<Word>,
}

impl Words {
    pub fn parse(data: &str, expected: usize) -> Result<Self, AbiError> {
        let words = decode_words(data)?;
        if words.len() < expected {
            return Err(AbiError::TooShort {
                expected,
                actual: words.len(),
            });
        }
        Ok(Self { words })
    }

    fn word(&self, index: usize) -> Result<&Word, AbiError> {
        self.words.get(index).ok_or(AbiError::TooShort {
            expected: index + 1,
            actual: self.words.len(),
        })
    }

    pub fn uint128(&self, index: usize) -> Result<u128, AbiError> {
        let word = self.word(index)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(AbiError::OutOfRange {
                index,
                target: "u128",
            });
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    pub fn uint64(&self, index: usize) -> Result<u64, AbiError> {
        u64::try_from(self.uint128(index)?).map_err(|_| AbiError::OutOfRange {
            index,
            target: "u64",
        })
    }

    pub fn boolean(&self, index: usize) -> Result<bool, AbiError> {
        match self.uint128(index)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(AbiError::InvalidBool { index }),
        }
    }

    /// An 18-decimal token amount.
    pub fn amount(&self, index: usize) -> Result<Decimal, AbiError> {
        let raw = self.uint128(index)?;
        Decimal::from_fixed_point(raw, TOKEN_DECIMALS).map_err(|_| AbiError::OutOfRange {
            index,
            target: "decimal",
        })
    }

    pub fn risk_tier(&self, index: usize) -> Result<RiskTier, AbiError> {
        let raw = self.uint128(index)?;
        u8::try_from(raw)
            .ok()
            .and_then(RiskTier::from_u8)
            .ok_or(AbiError::InvalidRiskTier { index })
    }

    /// A dynamic `uint256[]` whose head offset sits at word `index`.
    pub fn uint64_array(&self, index: usize) -> Result<Vec<u64>, AbiError> {
        let offset = self.uint64(index)? as usize;
        if offset % 32 != 0 {
            return Err(AbiError::OutOfRange {
                index,
                target: "array offset",
            });
        }
        let len_index = offset / 32;
        let end = usize::try_from(self.uint64(len_index)?)
            .ok()
            .and_then(|len| len_index.checked_add(1)?.checked_add(len))
            .ok_or(AbiError::OutOfRange {
                index: len_index,
                target: "array length",
            })?;
        if self.words.len() < end {
            return Err(AbiError::TooShort {
                expected: end,
                actual: self.words.len(),
            });
        }
        (len_index + 1..end).map(|i| self.uint64(i)).collect()
    }
}
