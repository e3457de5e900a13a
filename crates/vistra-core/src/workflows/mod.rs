//! # Workflows Module
//!
//! This module provides the high-level document API that orchestrates the
//! core models and the engine into a complete editing session.
//!
//! ## Overview
//!
//! Workflows are the top-level entry points for users of vistra. The
//! [`document::Document`] ties the project tree, undo log, selection,
//! lazy loader, and background pipeline together behind one facade:
//! opening and saving archives, importing external content, copy/paste,
//! and cross-document transfer, with every completion applied on the
//! caller's context.

pub mod document;
