//! cinder-cluster: static consistent-hash routing.
//!
//! A redirection shim, not a data plane: each node answers commands for
//! the keys it owns and points clients elsewhere with `-MOVED` replies.
//! Membership is fixed at startup from the config file.

pub mod ring;
pub mod router;

pub use ring::Ring;
pub use router::{key_slot, ClusterRouter, SLOT_COUNT};
