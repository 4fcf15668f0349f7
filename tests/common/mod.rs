//! Common test utilities and fixtures for case-indexer integration tests
//!
//! This module provides:
//! - `TestRepo` builder for creating Python test trees on disk
//! - Source snippets shared across test files
//! - Assertions comparing the store with the index

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod assertions;
pub mod test_repo;

pub use assertions::*;
pub use test_repo::TestRepo;

/// Class with two test methods and a helper
pub const LOGIN_CASES: &str = r#"class TestLogin:
    """Login flows"""

    def test_valid_password(self):
        """Accepts the right password"""
        assert login("u", "p")

    def test_wrong_password(self):
        assert not login("u", "x")

    def helper(self):
        return 1
"#;

/// Class with one test method
pub const CART_CASES: &str = r#"class TestCart:
    """Shopping cart"""

    def test_add_item(self):
        """Adds one item"""
        cart.add(1)
"#;

/// Unterminated call
pub const BROKEN_SOURCE: &str = "class TestBroken:\n    def test_x(self):\n        foo(\n";
