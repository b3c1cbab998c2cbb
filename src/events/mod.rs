//! # Events Module
//!
//! Progress reporting for batch runs. The pipeline sends [`Event`]s on a
//! channel; the CLI drives its progress bar from them and tests use them to
//! observe task lifecycles.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Batch(BatchEvent::Progress(p)) = event {
//!             println!("{}/{} {}", p.completed, p.total, p.current);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&images, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;
