use crate::error::{PipelineError, Result};
use std::fmt;
use std::str::FromStr;

/// Which side of the pivot gets masked when building a variant.
///
/// `Forward` estimates P(token | left context) by hiding the pivot and
/// everything to its right; `Backward` estimates P(token | right context) by
/// hiding the pivot and everything to its left. Boundary markers are never
/// hidden under either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Mask the pivot and all tokens to its right, up to the end marker.
    Forward,
    /// Mask the pivot and all tokens to its left, down to the begin marker.
    Backward,
}

impl Direction {
    /// Canonical lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            other => Err(PipelineError::InvalidDirection(other.to_string())),
        }
    }
}

/// A token-id sequence with one directional run of interior tokens replaced by
/// the mask marker.
///
/// Built per oracle query and discarded after the predicted distribution is
/// read; the source sequence is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedVariant {
    /// Token ids with the masked run replaced by the mask marker id.
    pub ids: Vec<u32>,
    /// The masking direction this variant was built with.
    pub direction: Direction,
    /// Interior position whose prediction this variant is for.
    pub pivot: usize,
}

/// Builds the masked variant of `ids` for one pivot and direction.
///
/// Forward replaces indices `pivot..=len-2`; backward replaces `1..=pivot`.
/// The boundary markers at `0` and `len-1` are left in place in both cases.
///
/// # Errors
///
/// Fails with [`PipelineError::DegenerateSentence`] when `ids` has no interior
/// positions, and with [`PipelineError::Unexpected`] when `pivot` falls outside
/// `1..=len-2`. Both are caller contract violations, not runtime conditions.
pub fn mask(ids: &[u32], mask_id: u32, pivot: usize, direction: Direction) -> Result<MaskedVariant> {
    let len = ids.len();
    if len < 3 {
        return Err(PipelineError::DegenerateSentence(len));
    }
    if pivot == 0 || pivot > len - 2 {
        return Err(PipelineError::Unexpected(format!(
            "mask pivot {pivot} outside interior range 1..={}",
            len - 2
        )));
    }

    let mut masked = ids.to_vec();
    let run = match direction {
        Direction::Forward => pivot..len - 1,
        Direction::Backward => 1..pivot + 1,
    };
    for id in &mut masked[run] {
        *id = mask_id;
    }

    Ok(MaskedVariant {
        ids: masked,
        direction,
        pivot,
    })
}
