//! Axis semantics: which file axis holds channels, and in which order the
//! file axes map onto image axes.
//!
//! ICS files name every axis (`layout order`). Names follow several legacy
//! vocabularies, so matching is table driven: adding a tag means adding a
//! table row.

use std::collections::BTreeMap;

use tracing::debug;

use crate::color::ColorSpaceRegistry;
use crate::error::{Error, Result};

/// Axis names that mark a channel axis without implying a color space.
const GENERIC_CHANNEL_TAGS: &[&str] = &["channel", "channels", "probe", "probes", "tensor"];

/// Axis names with a fixed canonical slot. These are placed before all others.
const SPATIAL_TAGS: &[(&str, usize)] = &[("x", 0), ("y", 1), ("z", 2)];

/// Prefix of explicitly numbered axes, `dim_<N>`.
const NUMBERED_PREFIX: &str = "dim_";

/// Without a recognized tag, the smallest axis of at most this size is
/// taken as the channel axis.
pub const MAX_IMPLICIT_CHANNELS: usize = 10;

/// Highest slot claimed by the spatial tags.
const LAST_SPATIAL_SLOT: usize = 2;

/// The channel axis of a file, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelAxis {
    /// File index of the channel axis.
    pub index: Option<usize>,
    /// Canonical color-space name, empty for generic channels.
    pub color_space: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisTag {
    /// `x`, `y` or `z`.
    Spatial(usize),
    /// `dim_<N>`.
    Numbered(usize),
    Unknown,
}

fn classify_axis_tag(tag: &str) -> AxisTag {
    if let Some(&(_, slot)) = SPATIAL_TAGS.iter().find(|(name, _)| name.eq_ignore_ascii_case(tag)) {
        return AxisTag::Spatial(slot);
    }
    match tag.get(..NUMBERED_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(NUMBERED_PREFIX) => {
            let rest = &tag[NUMBERED_PREFIX.len()..];
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            match rest[..digits].parse::<usize>() {
                Ok(n) => AxisTag::Numbered(n),
                Err(_) => AxisTag::Unknown,
            }
        }
        _ => AxisTag::Unknown,
    }
}

/// Finds the channel axis.
///
/// The first axis whose tag names a color space or a generic channel wins.
/// Otherwise the smallest axis of size at most [`MAX_IMPLICIT_CHANNELS`]
/// that is not tagged `x`, `y` or `z` is used (lowest index on ties); this
/// can still pick a short unnamed or numbered axis, such as three time
/// points.
pub fn find_channel_axis(tags: &[&str], sizes: &[usize], registry: &dyn ColorSpaceRegistry) -> ChannelAxis {
    for (ii, tag) in tags.iter().enumerate() {
        if let Some(name) = registry.canonical_name(tag) {
            return ChannelAxis { index: Some(ii), color_space: name.to_string() };
        }
        if GENERIC_CHANNEL_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return ChannelAxis { index: Some(ii), color_space: String::new() };
        }
    }
    let index = sizes
        .iter()
        .enumerate()
        .filter(|&(ii, &size)| {
            size <= MAX_IMPLICIT_CHANNELS
                && !matches!(tags.get(ii).map(|t| classify_axis_tag(t)), Some(AxisTag::Spatial(_)))
        })
        .min_by_key(|&(ii, &size)| (size, ii))
        .map(|(ii, _)| ii);
    ChannelAxis { index, color_space: String::new() }
}

/// Where a file axis goes in the canonical order.
#[derive(Debug, Clone, Copy, Default)]
struct FileAxis {
    slot: usize,
    recognized: bool,
    priority: bool,
}

/// Computes the canonical axis order: `order[ii]` is the file axis that
/// becomes image axis `ii`.
///
/// `x`, `y`, `z` come first. `dim_N` lands at index `N` where possible,
/// with unnamed axes filling the gaps in file order. The channel axis is
/// placed after every numbered axis.
pub fn canonical_order(tags: &[&str], channel_axis: Option<usize>) -> Result<Vec<usize>> {
    let n_dims = tags.len();
    let mut file = vec![FileAxis::default(); n_dims];
    let mut max_slot = LAST_SPATIAL_SLOT;
    for (ii, tag) in tags.iter().enumerate() {
        if Some(ii) == channel_axis {
            continue;
        }
        match classify_axis_tag(tag) {
            AxisTag::Spatial(slot) => file[ii] = FileAxis { slot, recognized: true, priority: true },
            AxisTag::Numbered(slot) => {
                file[ii] = FileAxis { slot, recognized: true, priority: false };
                max_slot = max_slot.max(slot);
            }
            AxisTag::Unknown => {}
        }
    }
    if let Some(channel) = channel_axis.filter(|&c| c < n_dims) {
        file[channel] = FileAxis { slot: max_slot.saturating_add(1), recognized: true, priority: false };
    }

    // slot -> file axes claiming it, in file order
    let mut claims: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut unknown = Vec::new();
    for (ii, axis) in file.iter().enumerate() {
        if axis.recognized {
            claims.entry(axis.slot).or_default().push(ii);
        } else {
            unknown.push(ii);
        }
    }

    let mut order = Vec::with_capacity(n_dims);
    for &ii in claims.values().flatten() {
        if file[ii].priority {
            order.push(ii);
        }
    }
    let mut unknown = unknown.into_iter();
    for &ii in claims.values().flatten() {
        if file[ii].priority {
            continue;
        }
        while order.len() < file[ii].slot {
            match unknown.next() {
                Some(u) => order.push(u),
                None => break,
            }
        }
        order.push(ii);
    }
    order.extend(unknown);

    check_permutation(&order, n_dims)?;
    Ok(order)
}

/// Verifies that `order` holds every index in `0..n` exactly once.
pub fn check_permutation(order: &[usize], n: usize) -> Result<()> {
    let mut seen = vec![false; n];
    for &ii in order {
        if ii >= n || std::mem::replace(&mut seen[ii], true) {
            return Err(Error::InternalConsistency(format!(
                "axis order {:?} is not a permutation of 0..{}",
                order, n
            )));
        }
    }
    if order.len() != n {
        return Err(Error::InternalConsistency(format!(
            "axis order {:?} has {} entries, expected {}",
            order,
            order.len(),
            n
        )));
    }
    Ok(())
}

/// Channel axis and canonical order of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSemantics {
    pub channel: ChannelAxis,
    pub order: Vec<usize>,
}

/// Resolves the axis semantics of a file from its axis tags and sizes.
pub fn resolve(tags: &[&str], sizes: &[usize], registry: &dyn ColorSpaceRegistry) -> Result<AxisSemantics> {
    let channel = find_channel_axis(tags, sizes, registry);
    let order = canonical_order(tags, channel.index)?;
    debug!(?tags, channel_axis = ?channel.index, color_space = %channel.color_space, ?order, "resolved axis order");
    Ok(AxisSemantics { channel, order })
}
