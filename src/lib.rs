//! Playback-state reconciliation for web players.
//!
//! A web player has two views of what is playing: its own local output
//! device, which knows everything about itself instantly, and the account's
//! playback status from the Web API, which knows about every device but is
//! only as fresh as the last poll. This crate merges both into one view,
//! extrapolates the playback position between updates, and routes control
//! commands to whichever device is authoritative.
//!
//! The entry point is [`client::Client`], which runs the core as a single
//! task and hands out [`client::Handle`]s to control it.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod arbiter;
pub mod client;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod http;
pub mod poller;
pub mod progress;
pub mod protocol;
pub mod remote;
pub mod signal;
pub mod state;
pub mod token;
pub mod transfer;
