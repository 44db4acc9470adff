//! Payload codec.
//!
//! The daemon flattens every request and reply body into the same primitive
//! vocabulary: big-endian `i32`s, length-prefixed UTF-8 strings (with -1
//! meaning null), and counted lists of both. [`PayloadWriter`] builds
//! outgoing bodies, [`PayloadReader`] picks incoming ones apart with bounds
//! checking on every read.
//!
//! # Example
//!
//! ```
//! use radiowire::codec::{PayloadReader, PayloadWriter};
//!
//! let body = PayloadWriter::new()
//!     .put_str("+15551234")
//!     .put_i32(0)
//!     .finish();
//!
//! let mut reader = PayloadReader::new(body);
//! assert_eq!(reader.read_string().unwrap(), Some("+15551234".to_string()));
//! assert_eq!(reader.read_i32().unwrap(), 0);
//! assert!(reader.is_empty());
//! ```

mod reader;
mod writer;

pub use reader::PayloadReader;
pub use writer::PayloadWriter;
