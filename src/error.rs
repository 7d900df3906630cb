//! Error outcomes for index operations. Every failure leaves the table unchanged.

use thiserror::Error;

/// Returned by `insert`/`insert_with` when the hash is already present.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum InsertError {
    #[error("hash {hash:#010x} already present")]
    AlreadyExists { hash: u32 },
}

/// Returned by `remove` when no item carries the hash.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoveError {
    #[error("hash {hash:#010x} not found")]
    NotFound { hash: u32 },
}

/// Returned by `Cursor::remove_current` when the cursor is not positioned
/// on a live item: nothing yielded yet, traversal finished, the item was
/// already removed through this cursor, or another thread removed it.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum CursorError {
    #[error("cursor is not positioned on a live item")]
    InvalidState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_hash_in_hex() {
        assert_eq!(
            InsertError::AlreadyExists { hash: 0x2a }.to_string(),
            "hash 0x0000002a already present"
        );
        assert_eq!(
            RemoveError::NotFound { hash: 0xdead_beef }.to_string(),
            "hash 0xdeadbeef not found"
        );
        assert_eq!(
            CursorError::InvalidState.to_string(),
            "cursor is not positioned on a live item"
        );
    }
}
