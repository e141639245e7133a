//! # Feed Session
//!
//! Glues the message receiver to recovery tracking and dispatch:
//!
//! - [`MessageReceiver`]: transport seam delivering [`ReceiverEvent`]s over a channel
//! - [`MessageValidator`] / [`FeedMessageValidator`]: structural checks before anything
//!   else sees a message
//! - [`MessageDataExtractor`] / [`XmlBasicDataExtractor`]: best-effort header
//!   extraction for unparsable-message reports
//! - [`FeedSession`]: one worker per open session running the pipeline
//! - [`Feed`]: composition root wiring the system-alive session, the user
//!   sessions and one [`feed_recovery::FeedRecoveryManager`] together
//!
//! Recovery tracking plugs in as a [`feed_recovery::MessageObserver`]; delivery
//! goes through the session's [`feed_dispatch::DispatcherStore`].

pub mod error;
pub mod extractor;
pub mod feed;
pub mod receiver;
pub mod session;
pub mod validator;

pub use error::{Result, SessionError};
pub use extractor::{BasicMessageData, MessageDataExtractor, XmlBasicDataExtractor};
pub use feed::{Feed, FeedBuilder};
pub use receiver::{MessageReceiver, ReceiverEvent};
pub use session::{FeedSession, FeedSessionBuilder};
pub use validator::{FeedMessageValidator, MessageValidator, ValidationResult};
