//! # ECDSA Crypto Toolbox
//!
//! A line-oriented TCP service exposing a small menu around an ECDSA
//! signing oracle. It is built as a signature forgery exercise:
//! - Random numbers are drawn from a per-connection Mersenne Twister
//! - The same generator supplies signing nonces
//! - Each connection may have exactly one message signed
//! - A debug menu is unlocked by signing a fresh server challenge
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                                   Server
//!   |                                         |
//!   |<------------ Welcome + Menu ------------|
//!   |------------- "1" ---------------------->|  random u32
//!   |------------- "2", message ------------->|  one signature
//!   |------------- "3" ---------------------->|
//!   |<------------ challenge (hex) -----------|
//!   |------------- signature (hex) ---------->|
//!   |<------------ Debug menu ----------------|  on success
//!   |------------- "4" ---------------------->|  Bye!
//!   |                                         |
//! ```

pub mod config;
pub mod error;
pub mod line_reader;
pub mod menu;
pub mod oracle;
pub mod registry;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::*;
pub use line_reader::*;
pub use menu::*;
pub use oracle::*;
pub use registry::*;
pub use server::*;
pub use transport::*;

/// Maximum buffered line length before a delimiter must appear
pub const MAX_LINE_LENGTH: usize = 16384;

/// Bytes requested from the socket per receive
pub const READ_CHUNK_SIZE: usize = 1024;

/// Size of the debug-menu challenge in bytes
pub const CHALLENGE_SIZE: usize = 128;

/// Number of 32-bit words used to seed the connection generator (128 bytes)
pub const SEED_WORDS: usize = 32;

/// Default listening port
pub const DEFAULT_PORT: u16 = 1337;
