pub mod codec;
pub mod error;
pub mod types;
pub mod util;

pub use codec::{checksum, decode, encode, timestamp_from_micros};
pub use error::DecodeError;
pub use types::{DataRecord, Reading, SourceKind, MAX_RECORD_SIZE, SERVER1_RECORD_SIZE, SERVER2_RECORD_SIZE};
pub use util::now_micros;
