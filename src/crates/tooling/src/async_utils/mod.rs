//! Async utilities for controller calls
//!
//! - Exponential backoff for transient transport failures
//! - A cumulative deadline shared by every call of one task
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::retry::RetryPolicy;
//! use tooling::async_utils::timeout::Deadline;
//! use std::time::Duration;
//!
//! let deadline = Deadline::new(Duration::from_secs(600));
//! let policy = RetryPolicy::new(3);
//!
//! for attempt in 0.. {
//!     match deadline.run(send_request()).await {
//!         Ok(Ok(response)) => break,
//!         Ok(Err(_)) if policy.should_retry(attempt) => {
//!             if !deadline.sleep(policy.delay_for(attempt)).await {
//!                 break;
//!             }
//!         }
//!         _ => break,
//!     }
//! }
//! ```

pub mod retry;
pub mod timeout;
