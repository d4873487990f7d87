//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in BurrowDB.
//!
//! ## zerocopy_accessors!
//!
//! Generates getter and setter methods for zerocopy struct fields that use
//! little-endian wrapper types (U32, U64). The accessors are the byte-swap
//! point between the fixed on-disk endianness and the host.
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::little_endian::U32;
//!
//! #[repr(C)]
//! struct BlockHeader {
//!     disk_size: U32,
//!     checksum: U32,
//! }
//!
//! impl BlockHeader {
//!     zerocopy_accessors! {
//!         disk_size: u32,
//!         checksum: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn disk_size(&self) -> u32 { self.disk_size.get() }
//! // pub fn set_disk_size(&mut self, val: u32) { self.disk_size = U32::new(val); }
//! // pub fn checksum(&self) -> u32 { self.checksum.get() }
//! // pub fn set_checksum(&mut self, val: u32) { self.checksum = U32::new(val); }
//! ```
//!
//! ## bail_code! / ensure_code!
//!
//! Boundary errors carry an [`crate::error::ErrorCode`] inside the
//! `eyre::Report` so callers can match on the code with `downcast_ref` while
//! the human-readable context still reads like any other eyre error.
//!
//! ```ignore
//! ensure_code!(size >= allocsize, ErrorCode::InvalidArgument,
//!     "impossibly small block size of {}B", size);
//! bail_code!(ErrorCode::PrepareConflict, "update for key is prepared");
//! ```

/// Generates getter and setter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_accessors {
    (@impl $field:ident, u32) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u32 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u32) {
                self.$field = ::zerocopy::little_endian::U32::new(val);
            }
        }
    };
    (@impl $field:ident, u64) => {
        ::paste::paste! {
            #[inline]
            pub fn $field(&self) -> u64 {
                self.$field.get()
            }

            #[inline]
            pub fn [<set_ $field>](&mut self, val: u64) {
                self.$field = ::zerocopy::little_endian::U64::new(val);
            }
        }
    };
    ($($field:ident : $ty:tt),* $(,)?) => {
        $(
            $crate::zerocopy_accessors!(@impl $field, $ty);
        )*
    };
}

/// Returns an error carrying the given [`crate::error::ErrorCode`] plus an
/// optional formatted context message.
#[macro_export]
macro_rules! bail_code {
    ($code:expr) => {
        return Err(::eyre::Report::new($code))
    };
    ($code:expr, $($arg:tt)*) => {
        return Err(::eyre::Report::new($code).wrap_err(format!($($arg)*)))
    };
}

/// Like `eyre::ensure!`, but the raised error carries an
/// [`crate::error::ErrorCode`].
#[macro_export]
macro_rules! ensure_code {
    ($cond:expr, $code:expr) => {
        if !$cond {
            $crate::bail_code!($code);
        }
    };
    ($cond:expr, $code:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::bail_code!($code, $($arg)*);
        }
    };
}
