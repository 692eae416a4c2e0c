//! pdfpal - chat with uploaded documents from the terminal
//!
//! This crate provides the client side of a document chat service:
//! - Durable session records with provisional and canonical ids
//! - The live query/reply channel and the history HTTP endpoint
//! - A chat controller that reconciles optimistic local state with the server
//!
//! # Architecture
//!
//! The backend answers questions about an uploaded document over a WebSocket
//! (`connection`) and serves confirmed transcripts over HTTP (`history`);
//! new documents are posted through `upload`.
//! The `controller` binds both to the locally persisted `session` records;
//! the `client` drives it from a single line-oriented event loop.

pub mod client;
pub mod config;
pub mod connection;
pub mod controller;
pub mod history;
pub mod protocol;
pub mod session;
pub mod upload;
