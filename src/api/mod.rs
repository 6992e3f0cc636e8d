//! REST client for the review server's `follow` endpoint.
//!
//! `GET /changes/{id}/follow` reports the recorded review target;
//! `POST /changes/{id}/follow` reconciles a proposal (dry run) or applies it.

mod client;
mod http;
mod types;

pub use client::GerritClient;
pub use types::FollowInput;
