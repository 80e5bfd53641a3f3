//! Tests for the permission resolver.
//!
//! Organized by functionality:
//! - Role precedence
//! - Cache interaction
//! - Failures and deadlines
