//! Swap client SDK.
//!
//! # Overview
//!
//! Client-side core of a DEX front end: cached oracle prices, cached and
//! observable account balances, and the amount calculations driving a swap
//! form.
//!
//! Use [`price::PriceCache`] over an [`oracle::HttpOracle`] to keep prices of
//! the supported feeds fresh, and [`balance::BalanceCache`] over a
//! [`ledger::Ledger`] implementation to read balances and subscribe to their
//! updates. [`swap`] derives counter-amounts, minimum-out and USD values from
//! the cached prices.
//!
//! [`session::Session`] ties both caches to a wallet and the backend, and
//! reconciles balances after every fund-moving operation.
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Prices are only pulled. The oracle also offers a streaming endpoint
//!   which would make polling unnecessary.
//!
//! * The ledger SDK and the wallet are consumed through traits only; this
//!   crate ships no implementation of either outside of [`testing`].
//!
//! # Testing
//!
//! [`testing`] module provides in-memory oracle, ledger and wallet doubles
//! together with token fixtures.

pub mod api;
pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod num;
pub mod oracle;
pub mod price;
pub mod session;
pub mod swap;
pub mod testing;
pub mod types;
