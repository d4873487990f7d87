//! # Sessions
//!
//! A session carries the per-caller context that cuts across components: the
//! quiet-corruption flag the block manager consults before dumping and
//! panicking, and the optional checkpoint binding that scopes cursor walks.
//!
//! ## Checkpoint Binding
//!
//! Binding a session to a checkpoint makes cursors opened from it observe
//! that checkpoint's captured snapshot instead of the live table. The
//! binding is resolved from a `checkpoint=<name>` configuration string
//! (absent name selects the most recent unnamed checkpoint) and may carry a
//! debug read timestamp overlaid on the checkpoint.

use std::sync::Arc;

use eyre::Result;

use crate::mvcc::{Checkpoint, Database, Timestamp};

#[derive(Default)]
pub struct Session {
    quiet_corrupt_file: bool,
    checkpoint: Option<CheckpointBinding>,
}

struct CheckpointBinding {
    checkpoint: Arc<Checkpoint>,
    debug_read_ts: Option<Timestamp>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, corruption is reported as a recoverable error with no dump.
    pub fn set_quiet_corrupt_file(&mut self, quiet: bool) {
        self.quiet_corrupt_file = quiet;
    }

    pub fn quiet_corrupt_file(&self) -> bool {
        self.quiet_corrupt_file
    }

    /// Binds the session to a checkpoint.
    pub fn bind_checkpoint(
        &mut self,
        checkpoint: Arc<Checkpoint>,
        debug_read_ts: Option<Timestamp>,
    ) {
        self.checkpoint = Some(CheckpointBinding {
            checkpoint,
            debug_read_ts,
        });
    }

    /// Resolves and binds a checkpoint from a configuration string, e.g.
    /// `checkpoint=ckpt1,debug=(checkpoint_read_timestamp=f)`.
    pub fn bind_checkpoint_config(&mut self, db: &Database, config: &str) -> Result<()> {
        let (checkpoint, debug_read_ts) = db.open_checkpoint(config)?;
        self.bind_checkpoint(checkpoint, debug_read_ts);
        Ok(())
    }

    pub fn clear_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    /// The bound checkpoint and its debug read timestamp, if any.
    pub fn checkpoint_binding(&self) -> Option<(&Arc<Checkpoint>, Option<Timestamp>)> {
        self.checkpoint
            .as_ref()
            .map(|b| (&b.checkpoint, b.debug_read_ts))
    }
}
