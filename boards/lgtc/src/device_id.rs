//! Node naming
//!
//! Nodes are addressed as `LGTC<id>`, where `<id>` is the identifier given
//! on the command line with all spaces removed. Without an identifier the
//! node falls back to `LGTCxy`.
//!
//! # Usage
//!
//! ```ignore
//! let name = device_id::node_name(Some("1 23"))?;
//! assert_eq!(name, "LGTC123");
//! ```

use heapless::String;

use crate::error::BoardError;

/// Prefix shared by every node name
pub const NODE_PREFIX: &str = "LGTC";

/// Identifier used when none is given
pub const DEFAULT_ID: &str = "xy";

/// Maximum length of a node name
/// Format: "LGTC" (4 chars) + up to 28 identifier chars
pub const NODE_NAME_MAX_LEN: usize = 32;

pub type NodeName = String<NODE_NAME_MAX_LEN>;

/// Build the node name from an optional command line identifier
///
/// # Errors
///
/// `BoardError::NodeIdTooLong` if the name does not fit in
/// `NODE_NAME_MAX_LEN` bytes.
pub fn node_name(id: Option<&str>) -> Result<NodeName, BoardError> {
    let mut name = NodeName::new();
    // "LGTC" is 4 bytes, well under NODE_NAME_MAX_LEN
    name.push_str(NODE_PREFIX).expect("prefix should fit");

    let id = id.unwrap_or(DEFAULT_ID);
    for c in id.chars().filter(|c| *c != ' ') {
        name.push(c)
            .map_err(|_| BoardError::NodeIdTooLong(id.to_string()))?;
    }
    if name.len() == NODE_PREFIX.len() {
        // Identifier was only spaces
        name.push_str(DEFAULT_ID).expect("default should fit");
    }
    Ok(name)
}
