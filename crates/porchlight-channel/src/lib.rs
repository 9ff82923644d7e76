//! Out-of-band verification code handshake.
//!
//! When the target site raises a step-up verification challenge during an
//! unattended run, nobody is at the browser to type the code. The
//! [`VerificationChannel`] bridges that gap: it publishes a single-use
//! private document the operator can edit from anywhere, mails them the
//! link, polls the document for a 6-digit code, and deletes the document
//! no matter how the exchange ends.

pub mod channel;
pub mod error;
pub mod store;

pub use channel::{extract_code, CodeChannel, VerificationChannel, VerificationTicket, CODE_SENTINEL};
pub use error::{ChannelError, Result};
pub use store::{CodeStore, GistStore, StoredDocument};
