//! # Timestamps
//!
//! All engine timestamps are unsigned 64-bit logical clocks assigned by the
//! caller, never by the engine. `TS_NONE` (zero) doubles as "no timestamp":
//! an update committed without a timestamp is visible at every read
//! timestamp, and a stable timestamp of `TS_NONE` means it was never set.
//! `TS_LATEST` is the read timestamp of a reader that wants the newest
//! committed data.
//!
//! Configuration strings carry timestamps in hexadecimal, e.g.
//! `read_timestamp=1e`.

use eyre::Result;

use crate::error::ErrorCode;
use crate::{bail_code, ensure_code};

pub type Timestamp = u64;
pub type TxnId = u64;

/// "No timestamp"; also the initial stable timestamp.
pub const TS_NONE: Timestamp = 0;

/// Reads at `TS_LATEST` see the newest committed data.
pub const TS_LATEST: Timestamp = u64::MAX;

/// Parses a hexadecimal timestamp from a configuration string.
pub fn parse_timestamp(hex: &str) -> Result<Timestamp> {
    ensure_code!(
        !hex.is_empty(),
        ErrorCode::InvalidArgument,
        "empty timestamp value"
    );
    let Ok(ts) = Timestamp::from_str_radix(hex, 16) else {
        bail_code!(
            ErrorCode::InvalidArgument,
            "failed to parse timestamp {hex:?}: expected a hexadecimal value"
        );
    };
    ensure_code!(
        ts != TS_NONE,
        ErrorCode::InvalidArgument,
        "zero timestamp is not permitted"
    );
    Ok(ts)
}
