//! Track Name Grammar
//!
//! This module parses track names into their addressing parts. A track name
//! selects a node, optionally a sub-object of it, and a property:
//!
//! ```text
//! [directories] nodeName [.objectName[objectIndex]] .propertyName [propertyIndex]
//! ```
//!
//! - Leading `directory/` (or `directory:`) prefixes are accepted and
//!   ignored; resolution searches the whole subtree by node name.
//! - Node names may contain dots. Since object and property names may not,
//!   a dotted tail is treated as an object name only when it is one of the
//!   known sub-object names (`material`, `materials`, `bones`, `map`), or
//!   when it carries a bracketed index.
//! - Indices are kept as raw strings. They are usually numeric but may be
//!   symbolic (a bone or morph target name) and are resolved at bind time.
//! - The characters `[ ] . : /` and whitespace are reserved and may not
//!   appear in names. Inside brackets anything goes.
//!
//! An empty node name (as in `.position`) addresses the root object passed
//! at bind time.

use smallvec::SmallVec;

use crate::errors::{MixError, Result};

/// Object names that may follow a node name with a plain dot. Anything else
/// dotted is part of the node name.
pub const SUPPORTED_OBJECT_NAMES: [&str; 4] = ["material", "materials", "bones", "map"];

/// A parsed track name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPath {
    /// Name of the target node. Empty, `"."` or the root's own name select
    /// the bind root directly.
    pub node: String,
    /// Sub-object to descend into, if any (`material`, `bones`, ...).
    pub object: Option<String>,
    /// Raw index into the sub-object, numeric or symbolic.
    pub object_index: Option<String>,
    /// Name of the animated property.
    pub property: String,
    /// Raw index into an array-shaped property, numeric or symbolic.
    pub property_index: Option<String>,
}

/// One dot-separated piece of a path: a name plus an optional bracket blob.
struct RawSeg<'a> {
    name: &'a str,
    index: Option<&'a str>,
}

impl TrackPath {
    /// Parses a track name. Fails with [`MixError::BadTrackPath`] when the
    /// string does not follow the grammar (no property part, reserved
    /// characters in a name, a dangling index, ...).
    pub fn parse(path: &str) -> Result<Self> {
        Self::parse_parts(strip_directories(path)).map_err(|reason| MixError::BadTrackPath {
            path: path.to_string(),
            reason,
        })
    }

    fn parse_parts(rest: &str) -> std::result::Result<Self, &'static str> {
        let segs = split_segments(rest)?;

        // The property is always the last segment and needs a leading dot,
        // so a lone name is not a valid path.
        if segs.len() < 2 {
            return Err("missing property name");
        }
        let prop_seg = &segs[segs.len() - 1];
        if prop_seg.name.is_empty() {
            return Err("empty property name");
        }

        let body = &segs[..segs.len() - 1];
        let mut node = String::new();
        let mut object = None;
        let mut object_index = None;

        if let Some((last, front)) = body.split_last() {
            // Only the object position may carry an index.
            for seg in front {
                if seg.index.is_some() {
                    return Err("unexpected index in node name");
                }
            }
            if last.index.is_some() {
                // An object segment needs a node (possibly empty) and a dot
                // in front of it; a bracket on the head segment is invalid.
                if front.is_empty() {
                    return Err("unexpected index in node name");
                }
                if last.name.is_empty() {
                    return Err("empty object name");
                }
                object = Some(last.name.to_string());
                object_index = last.index.map(str::to_string);
                node = join_names(front);
            } else {
                node = join_names(body);
                // A dotted tail is an object name only when recognized;
                // otherwise the whole thing is a (dotted) node name.
                if let Some(dot) = node.rfind('.') {
                    let tail = &node[dot + 1..];
                    if SUPPORTED_OBJECT_NAMES.contains(&tail) {
                        object = Some(tail.to_string());
                        node.truncate(dot);
                    }
                }
            }
        }

        Ok(Self {
            node,
            object,
            object_index,
            property: prop_seg.name.to_string(),
            property_index: prop_seg.index.map(str::to_string),
        })
    }
}

/// Drops leading `name/` and `name:` prefixes. A directory name may not
/// contain reserved characters (dots included), so `a.b/c` is left intact
/// for the segment scanner to reject.
fn strip_directories(path: &str) -> &str {
    let mut rest = path;
    loop {
        let mut cut = None;
        for (i, c) in rest.char_indices() {
            if c == '/' || c == ':' {
                if i > 0 {
                    cut = Some(i);
                }
                break;
            }
            if is_reserved(c) {
                break;
            }
        }
        match cut {
            Some(i) => rest = &rest[i + 1..],
            None => return rest,
        }
    }
}

#[inline]
fn is_reserved(c: char) -> bool {
    matches!(c, '[' | ']' | '.' | ':' | '/') || c.is_whitespace()
}

/// Splits a path body on top-level dots. A `[` opens an index blob that runs
/// to the last `]` of its segment; dots inside a blob do not split.
fn split_segments(s: &str) -> std::result::Result<SmallVec<[RawSeg<'_>; 6]>, &'static str> {
    let mut segs: SmallVec<[RawSeg<'_>; 6]> = SmallVec::new();
    let mut seg_start = 0usize;
    let mut name_end: Option<usize> = None;
    let mut index_start = 0usize;
    let mut pending_index: Option<&str> = None;
    let mut in_brackets = false;

    let mut iter = s.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if in_brackets {
            // A ']' closes the blob only at a segment boundary; any other
            // ']' belongs to the index text.
            if c == ']' && matches!(iter.peek(), None | Some(&(_, '.'))) {
                pending_index = Some(&s[index_start..i]);
                in_brackets = false;
            }
            continue;
        }
        match c {
            '.' => {
                segs.push(RawSeg {
                    name: &s[seg_start..name_end.unwrap_or(i)],
                    index: pending_index.take(),
                });
                seg_start = i + 1;
                name_end = None;
            }
            '[' => {
                name_end = Some(i);
                index_start = i + 1;
                in_brackets = true;
            }
            ']' => return Err("unexpected ']'"),
            ':' | '/' => return Err("reserved character in name"),
            c if c.is_whitespace() => return Err("whitespace in name"),
            _ => {}
        }
    }
    if in_brackets {
        return Err("unterminated index");
    }
    segs.push(RawSeg {
        name: &s[seg_start..name_end.unwrap_or(s.len())],
        index: pending_index.take(),
    });
    Ok(segs)
}

fn join_names(segs: &[RawSeg<'_>]) -> String {
    let mut out = String::new();
    for (i, seg) in segs.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(seg.name);
    }
    out
}
