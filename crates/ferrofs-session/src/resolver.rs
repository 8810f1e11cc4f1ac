//! Location resolution glue.
//!
//! The resolver itself is an external collaborator; this module holds
//! the seam trait and the one piece of session-side behavior around it:
//! when the resolver's canonical path disagrees with the client-supplied
//! path, the mismatch is logged at low severity and the request proceeds
//! with the resolved value.

use tracing::debug;

use crate::error::Result;
use crate::types::{InodeId, Location};

/// Resolves a client-supplied inode/parent/name/path tuple to a
/// filesystem location.
pub trait LocationResolver: Send + Sync {
    /// Resolves to a location, or `SessionError::NotFound` on a miss.
    /// A miss is a normal outcome, not logged as an error.
    fn resolve(
        &self,
        entity_id: Option<InodeId>,
        parent_id: Option<InodeId>,
        name: Option<&str>,
        client_path: &str,
    ) -> Result<Location>;
}

/// Resolves a location and reconciles it with the client-supplied path.
///
/// The resolved canonical path always wins; a disagreement with the
/// client path is a protocol oddity worth a debug log, not a failure.
pub fn resolve_location(
    resolver: &dyn LocationResolver,
    entity_id: Option<InodeId>,
    parent_id: Option<InodeId>,
    name: Option<&str>,
    client_path: &str,
) -> Result<Location> {
    let location = resolver.resolve(entity_id, parent_id, name, client_path)?;
    if location.canonical_path != client_path {
        debug!(
            ino = %location.entity.ino,
            client_path,
            canonical_path = %location.canonical_path,
            "paths differ for inode"
        );
    }
    Ok(location)
}
