//! Ring positions: tokens, partitioners and token ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position on the ring, totally ordered as a signed 64-bit integer.
///
/// [`Token::MIN`] is the ring origin and is never assigned to a partition key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(i64);

impl Token {
    pub const MIN: Token = Token(i64::MIN);
    pub const MAX: Token = Token(i64::MAX);

    pub const fn new(value: i64) -> Self {
        Token(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// The next token on the ring, `None` past [`Token::MAX`].
    pub fn successor(self) -> Option<Token> {
        self.0.checked_add(1).map(Token)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Token(value)
    }
}

impl From<i32> for Token {
    fn from(value: i32) -> Self {
        Token(i64::from(value))
    }
}

/// Raw partition key bytes as serialized by the host.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(Vec<u8>);

impl PartitionKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PartitionKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        PartitionKey(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for PartitionKey {
    fn from(value: Vec<u8>) -> Self {
        PartitionKey(value)
    }
}

impl From<&[u8]> for PartitionKey {
    fn from(value: &[u8]) -> Self {
        PartitionKey(value.to_vec())
    }
}

/// A partition key paired with its token. Orders by token, then key bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    pub token: Token,
    pub key: PartitionKey,
}

/// Deterministic mapping from partition keys to ring positions.
pub trait Partitioner: Send + Sync {
    fn token(&self, key: &[u8]) -> Token;

    fn decorate(&self, key: PartitionKey) -> DecoratedKey {
        DecoratedKey {
            token: self.token(key.as_bytes()),
            key,
        }
    }
}

/// Hash partitioner over XXH3-64.
///
/// The hash is reinterpreted as a signed token; the single hash that lands on
/// [`Token::MIN`] is folded onto [`Token::MAX`] so the origin stays unassigned.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn token(&self, key: &[u8]) -> Token {
        let value = xxhash_rust::xxh3::xxh3_64(key) as i64;
        if value == i64::MIN {
            Token::MAX
        } else {
            Token(value)
        }
    }
}

/// Half-open ring interval `(left, right]`.
///
/// `left >= right` wraps past the origin; `(MIN, MIN]` is the whole ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRange {
    left: Token,
    right: Token,
}

impl TokenRange {
    pub fn new(left: impl Into<Token>, right: impl Into<Token>) -> Self {
        TokenRange {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn full_ring() -> Self {
        TokenRange::new(Token::MIN, Token::MIN)
    }

    pub fn left(&self) -> Token {
        self.left
    }

    pub fn right(&self) -> Token {
        self.right
    }

    pub fn is_wrapping(&self) -> bool {
        self.left >= self.right
    }

    pub fn contains(&self, token: Token) -> bool {
        if self.is_wrapping() {
            token > self.left || token <= self.right
        } else {
            token > self.left && token <= self.right
        }
    }

    /// Split into at most two non-wrapping ranges covering the same tokens.
    pub fn split_wrap(&self) -> Vec<TokenRange> {
        if !self.is_wrapping() {
            return vec![*self];
        }
        let mut out = Vec::with_capacity(2);
        if self.right != Token::MIN {
            out.push(TokenRange::new(Token::MIN, self.right));
        }
        if self.left != Token::MAX {
            out.push(TokenRange::new(self.left, Token::MAX));
        }
        out
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.left, self.right)
    }
}
