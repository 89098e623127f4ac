//! # mailsweep-gmail
//!
//! Gmail REST client built around a batch RPC gateway.
//!
//! ## Features
//!
//! - **Batch gateway**: up to 100 fetch/modify/trash calls per physical
//!   request, with an outcome for every item
//! - **Partial failure**: a failing item never fails the batch
//! - **Typed payloads**: messages, threads, labels and profile
//! - **Testability**: the [`Gateway`] trait is the seam used by callers
//! - **Token renewal**: an [`AccessTokenSource`] is asked for the token on
//!   every call and renews it once after a 401
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsweep_gmail::{Gateway, GmailClient, MessageFormat};
//!
//! let client = GmailClient::new(access_token)?;
//! let page = client.list_messages("category:promotions", None, 100).await?;
//! let ids: Vec<String> = page.messages.into_iter().map(|m| m.id).collect();
//!
//! client
//!     .fetch_messages(&ids, MessageFormat::Metadata, |id, outcome| match outcome {
//!         Ok(message) => println!("{id}: {:?}", message.header("From")),
//!         Err(failure) => eprintln!("{id}: {failure}"),
//!     })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod batch;
mod client;
pub mod config;
mod error;
pub mod gateway;
mod token;
pub mod types;

pub use client::GmailClient;
pub use config::{Config, ConfigBuilder, MAX_BATCH_SIZE, MAX_PAGE_SIZE};
pub use error::{Error, Result};
pub use gateway::{Gateway, ItemFailure, ItemResult, METADATA_HEADERS, MessageFormat};
pub use token::{AccessTokenSource, StaticToken};
pub use types::{
    Header, Label, LabelChange, LabelType, Message, MessageList, MessagePart, MessageRef, PartBody,
    Profile, Thread, ThreadList, ThreadRef, system,
};
