//! Layout spec value and its builder.
//!
//! A spec is built once with the fluent [`LayoutBuilder`] and is immutable
//! afterwards; all offsets are computed at build time, and decoding operates
//! purely over the built data.

use crate::error::{LayoutError, Result};

/// One declared byte region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Region whose bytes must match exactly at its computed offset.
    Fixed { name: String, bytes: Vec<u8> },
    /// Opaque extractable region of a declared length.
    ByLength { name: String, len: usize },
}

impl Target {
    /// The target's declared name.
    pub fn name(&self) -> &str {
        match self {
            Target::Fixed { name, .. } => name,
            Target::ByLength { name, .. } => name,
        }
    }

    /// The number of bytes this target spans.
    pub fn len(&self) -> usize {
        match self {
            Target::Fixed { bytes, .. } => bytes.len(),
            Target::ByLength { len, .. } => *len,
        }
    }

    /// Whether the target spans zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Presence precondition of a conditional group, resolved to an offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Presence {
    pub(crate) offset: usize,
    pub(crate) expected: Vec<u8>,
}

/// A declared group of targets addressed as `(group, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Group {
    pub(crate) name: String,
    pub(crate) offset: usize,
    pub(crate) len: usize,
    pub(crate) presence: Option<Presence>,
}

/// One positioned target of a built layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    /// Index into the spec's group table, if the target is grouped.
    pub(crate) group: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) target: Target,
}

/// An immutable, validated binary layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSpec {
    pub(crate) entries: Vec<Entry>,
    pub(crate) groups: Vec<Group>,
    pub(crate) total_len: usize,
}

impl LayoutSpec {
    /// Start building a layout.
    pub fn builder() -> LayoutBuilder {
        LayoutBuilder::new()
    }

    /// Total declared layout length in bytes.
    ///
    /// Conditional groups count towards the total whether present or not;
    /// an absent group still occupies its declared span in the buffer.
    pub fn total_len(&self) -> usize {
        self.total_len
    }
}

enum Op {
    Fixed { name: String, bytes: Vec<u8> },
    ByLength { name: String, len: usize },
    GroupStart { name: String, when: Option<(String, Vec<u8>)> },
    GroupEnd,
}

/// Fluent builder for [`LayoutSpec`].
///
/// Declaration order is buffer order. Errors (unbalanced groups, duplicate
/// names, bad presence preconditions) surface from [`LayoutBuilder::build`].
#[derive(Default)]
pub struct LayoutBuilder {
    ops: Vec<Op>,
}

impl LayoutBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a region whose bytes must match `bytes` exactly.
    ///
    /// The cursor advances by `bytes.len()` regardless of validation
    /// outcome, so subsequent offsets stay computable even after a failed
    /// match.
    pub fn fixed(mut self, name: &str, bytes: &[u8]) -> Self {
        self.ops.push(Op::Fixed {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        self
    }

    /// Declare an extractable region of exactly `len` bytes with no value
    /// constraint.
    pub fn by_length(mut self, name: &str, len: usize) -> Self {
        self.ops.push(Op::ByLength {
            name: name.to_string(),
            len,
        });
        self
    }

    /// Open a group; targets declared before the matching
    /// [`LayoutBuilder::group_end`] are addressed as `(group, name)`.
    pub fn group_start(mut self, name: &str) -> Self {
        self.ops.push(Op::GroupStart {
            name: name.to_string(),
            when: None,
        });
        self
    }

    /// Open a conditional group, present only when the earlier top-level
    /// target `target` decodes to `expected`.
    ///
    /// An absent group still advances the cursor by its declared length, so
    /// targets after the group keep their offsets either way.
    pub fn group_start_when(mut self, name: &str, target: &str, expected: &[u8]) -> Self {
        self.ops.push(Op::GroupStart {
            name: name.to_string(),
            when: Some((target.to_string(), expected.to_vec())),
        });
        self
    }

    /// Close the currently open group.
    pub fn group_end(mut self) -> Self {
        self.ops.push(Op::GroupEnd);
        self
    }

    /// Resolve offsets and produce the immutable spec.
    pub fn build(self) -> Result<LayoutSpec> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut groups: Vec<Group> = Vec::new();
        let mut cursor = 0usize;
        let mut open: Option<usize> = None;

        for op in self.ops {
            match op {
                Op::Fixed { name, bytes } => {
                    let len = bytes.len();
                    push_entry(&mut entries, &groups, open, cursor, Target::Fixed { name, bytes })?;
                    cursor += len;
                }
                Op::ByLength { name, len } => {
                    push_entry(
                        &mut entries,
                        &groups,
                        open,
                        cursor,
                        Target::ByLength { name, len },
                    )?;
                    cursor += len;
                }
                Op::GroupStart { name, when } => {
                    if let Some(idx) = open {
                        return Err(LayoutError::NestedGroup(name, groups[idx].name.clone()));
                    }
                    if groups.iter().any(|g| g.name == name) {
                        return Err(LayoutError::DuplicateTarget {
                            scope: "layout".to_string(),
                            name,
                        });
                    }
                    let presence = match when {
                        None => None,
                        Some((target, expected)) => {
                            Some(resolve_presence(&entries, &target, expected)?)
                        }
                    };
                    groups.push(Group {
                        name,
                        offset: cursor,
                        len: 0,
                        presence,
                    });
                    open = Some(groups.len() - 1);
                }
                Op::GroupEnd => {
                    let idx = open.take().ok_or(LayoutError::GroupNotOpen)?;
                    groups[idx].len = cursor - groups[idx].offset;
                }
            }
        }

        if let Some(idx) = open {
            return Err(LayoutError::GroupNotClosed(groups[idx].name.clone()));
        }

        Ok(LayoutSpec {
            entries,
            groups,
            total_len: cursor,
        })
    }
}

fn push_entry(
    entries: &mut Vec<Entry>,
    groups: &[Group],
    open: Option<usize>,
    offset: usize,
    target: Target,
) -> Result<()> {
    let duplicate = entries
        .iter()
        .any(|e| e.group == open && e.target.name() == target.name());
    if duplicate {
        let scope = match open {
            Some(idx) => format!("group '{}'", groups[idx].name),
            None => "layout".to_string(),
        };
        return Err(LayoutError::DuplicateTarget {
            scope,
            name: target.name().to_string(),
        });
    }
    entries.push(Entry {
        group: open,
        offset,
        target,
    });
    Ok(())
}

fn resolve_presence(entries: &[Entry], target: &str, expected: Vec<u8>) -> Result<Presence> {
    let entry = entries
        .iter()
        .find(|e| e.group.is_none() && e.target.name() == target)
        .ok_or_else(|| LayoutError::UnknownPresenceTarget(target.to_string()))?;
    if entry.target.len() != expected.len() {
        return Err(LayoutError::PresenceLengthMismatch {
            target: target.to_string(),
            expected_len: expected.len(),
            target_len: entry.target.len(),
        });
    }
    Ok(Presence {
        offset: entry.offset,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_accumulate_in_declaration_order() {
        let spec = LayoutSpec::builder()
            .fixed("flags", &[0x02, 0x01, 0x06])
            .by_length("serial", 4)
            .by_length("status", 1)
            .build()
            .unwrap();

        assert_eq!(spec.total_len(), 8);
        assert_eq!(spec.entries[0].offset, 0);
        assert_eq!(spec.entries[1].offset, 3);
        assert_eq!(spec.entries[2].offset, 7);
    }

    #[test]
    fn group_spans_its_children() {
        let spec = LayoutSpec::builder()
            .fixed("flags", &[0x02])
            .group_start("manufacture")
            .fixed("type", &[0xff])
            .by_length("payload", 5)
            .group_end()
            .by_length("tail", 2)
            .build()
            .unwrap();

        assert_eq!(spec.total_len(), 9);
        assert_eq!(spec.groups[0].offset, 1);
        assert_eq!(spec.groups[0].len, 6);
        assert_eq!(spec.entries[3].offset, 7); // tail sits after the group
    }

    #[test]
    fn nested_group_is_rejected() {
        let result = LayoutSpec::builder()
            .group_start("outer")
            .group_start("inner")
            .build();
        assert!(matches!(result, Err(LayoutError::NestedGroup(_, _))));
    }

    #[test]
    fn unbalanced_groups_are_rejected() {
        assert!(matches!(
            LayoutSpec::builder().group_end().build(),
            Err(LayoutError::GroupNotOpen)
        ));
        assert!(matches!(
            LayoutSpec::builder().group_start("open").build(),
            Err(LayoutError::GroupNotClosed(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected_per_scope() {
        let result = LayoutSpec::builder()
            .by_length("field", 1)
            .by_length("field", 2)
            .build();
        assert!(matches!(result, Err(LayoutError::DuplicateTarget { .. })));

        // Same name in different scopes is fine.
        let spec = LayoutSpec::builder()
            .by_length("length", 1)
            .group_start("manufacture")
            .by_length("length", 1)
            .group_end()
            .build();
        assert!(spec.is_ok());
    }

    #[test]
    fn presence_must_reference_earlier_top_level_target() {
        let result = LayoutSpec::builder()
            .group_start_when("ext", "missing", &[0x01])
            .group_end()
            .build();
        assert!(matches!(result, Err(LayoutError::UnknownPresenceTarget(_))));
    }

    #[test]
    fn presence_length_mismatch_is_rejected() {
        let result = LayoutSpec::builder()
            .by_length("mode", 1)
            .group_start_when("ext", "mode", &[0x01, 0x02])
            .group_end()
            .build();
        assert!(matches!(
            result,
            Err(LayoutError::PresenceLengthMismatch { .. })
        ));
    }
}
