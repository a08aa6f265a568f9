//! Block header and body storage.

use crate::db::{BatchOp, Result, Storage, Store};
use powchain_core::{BlockBody, BlockHeader, Hash};

/// Manages block headers and stripped bodies.
pub struct ChainStore<'a> {
    storage: &'a Storage,
}

impl<'a> ChainStore<'a> {
    /// Create a new ChainStore wrapping the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    // =========================================================================
    // Headers
    // =========================================================================

    /// Store a header under its `curHash`.
    pub fn put_header(&self, header: &BlockHeader) -> Result<()> {
        self.storage
            .put(Store::Headers, Storage::hash_key(&header.cur_hash), header)
    }

    /// Get a header by block hash.
    pub fn get_header(&self, hash: &Hash) -> Result<Option<BlockHeader>> {
        self.storage.get(Store::Headers, Storage::hash_key(hash))
    }

    /// Get a header, failing with `NotFound` if it is absent.
    pub fn require_header(&self, hash: &Hash) -> Result<BlockHeader> {
        self.storage.get_or_err(Store::Headers, Storage::hash_key(hash))
    }

    /// Check if a header exists.
    pub fn has_header(&self, hash: &Hash) -> Result<bool> {
        self.storage.contains(Store::Headers, Storage::hash_key(hash))
    }

    /// Every stored header, in key order.
    pub fn all_headers(&self) -> Result<Vec<BlockHeader>> {
        self.storage.scan_all(Store::Headers)
    }

    /// Whether no header has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty(Store::Headers)
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Store the stripped form of a body under its block hash.
    pub fn put_body(&self, hash: &Hash, body: &BlockBody) -> Result<()> {
        self.storage
            .put(Store::Bodies, Storage::hash_key(hash), &body.stripped())
    }

    /// Get a stored (stripped) body by block hash.
    pub fn get_body(&self, hash: &Hash) -> Result<Option<BlockBody>> {
        self.storage.get(Store::Bodies, Storage::hash_key(hash))
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Insert operation for a header, for use in an atomic commit.
    pub fn header_op(header: &BlockHeader) -> Result<BatchOp> {
        BatchOp::insert(Store::Headers, Storage::hash_key(&header.cur_hash), header)
    }

    /// Insert operation for the stripped form of a body.
    pub fn body_op(hash: &Hash, body: &BlockBody) -> Result<BatchOp> {
        BatchOp::insert(Store::Bodies, Storage::hash_key(hash), &body.stripped())
    }
}
