//! Validation and field extraction over a built [`LayoutSpec`].

use crate::spec::{Group, LayoutSpec, Target};

impl LayoutSpec {
    /// Check whether a buffer conforms to this layout.
    ///
    /// True iff the buffer is at least [`LayoutSpec::total_len`] bytes and
    /// every present `Fixed` target matches byte-for-byte at its computed
    /// offset. Fixed targets inside an absent conditional group are skipped.
    ///
    /// Never panics and never allocates; this runs as a device
    /// identification predicate against every observed advertisement.
    pub fn validate(&self, buf: &[u8]) -> bool {
        if buf.len() < self.total_len {
            return false;
        }
        for entry in &self.entries {
            let Target::Fixed { bytes, .. } = &entry.target else {
                continue;
            };
            if let Some(gidx) = entry.group {
                if !self.group_present(&self.groups[gidx], buf) {
                    continue;
                }
            }
            match buf.get(entry.offset..entry.offset + bytes.len()) {
                Some(actual) if actual == bytes.as_slice() => {}
                _ => return false,
            }
        }
        true
    }

    /// The exact slice for a previously declared target.
    ///
    /// Returns `None` if the `(group, name)` address is unknown, the buffer
    /// is too short to contain the region, or the target's group is absent.
    /// Callers must treat `None` as "cannot decode", never as zero-filled
    /// data.
    pub fn get_data<'a>(
        &self,
        buf: &'a [u8],
        group: Option<&str>,
        name: &str,
    ) -> Option<&'a [u8]> {
        let entry = self.entries.iter().find(|e| {
            e.target.name() == name
                && match (e.group, group) {
                    (None, None) => true,
                    (Some(gidx), Some(gname)) => self.groups[gidx].name == gname,
                    _ => false,
                }
        })?;
        if let Some(gidx) = entry.group {
            if !self.group_present(&self.groups[gidx], buf) {
                return None;
            }
        }
        buf.get(entry.offset..entry.offset + entry.target.len())
    }

    /// The `(group, name)` address of the first `Fixed` target that fails
    /// to match, or `None` if every present fixed target matches.
    ///
    /// Offsets stay computable past a failed match, so this walks the whole
    /// layout and names the exact region that broke when a known device
    /// stops identifying.
    pub fn first_mismatch(&self, buf: &[u8]) -> Option<(Option<&str>, &str)> {
        for entry in &self.entries {
            let Target::Fixed { name, bytes } = &entry.target else {
                continue;
            };
            if let Some(gidx) = entry.group {
                if !self.group_present(&self.groups[gidx], buf) {
                    continue;
                }
            }
            match buf.get(entry.offset..entry.offset + bytes.len()) {
                Some(actual) if actual == bytes.as_slice() => {}
                _ => {
                    let group = entry.group.map(|g| self.groups[g].name.as_str());
                    return Some((group, name.as_str()));
                }
            }
        }
        None
    }

    /// Like [`LayoutSpec::get_data`], wrapped with typed readers.
    pub fn field<'a>(
        &self,
        buf: &'a [u8],
        group: Option<&str>,
        name: &str,
    ) -> Option<FieldView<'a>> {
        self.get_data(buf, group, name).map(FieldView)
    }

    fn group_present(&self, group: &Group, buf: &[u8]) -> bool {
        match &group.presence {
            None => true,
            Some(p) => buf.get(p.offset..p.offset + p.expected.len()) == Some(p.expected.as_slice()),
        }
    }
}

/// Borrowed view of one extracted field with typed readers.
///
/// Readers require the exact field width and return `None` otherwise, so a
/// short or misdeclared region can never be read as zero-filled data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldView<'a>(pub &'a [u8]);

impl<'a> FieldView<'a> {
    /// The raw bytes of the field.
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    /// Read a one-byte field.
    pub fn u8(&self) -> Option<u8> {
        match self.0 {
            [b] => Some(*b),
            _ => None,
        }
    }

    /// Read a two-byte little-endian unsigned field.
    pub fn u16_le(&self) -> Option<u16> {
        Some(u16::from_le_bytes(self.0.try_into().ok()?))
    }

    /// Read a two-byte little-endian signed field.
    pub fn i16_le(&self) -> Option<i16> {
        Some(i16::from_le_bytes(self.0.try_into().ok()?))
    }

    /// Read a two-byte big-endian unsigned field.
    pub fn u16_be(&self) -> Option<u16> {
        Some(u16::from_be_bytes(self.0.try_into().ok()?))
    }

    /// Element-wise comparison against an expected byte sequence.
    ///
    /// Used for sentinel detection, e.g. the `[0xee, 0xee]` "measurement
    /// error" pair some beacon formats emit in place of a reading.
    pub fn matches(&self, expected: &[u8]) -> bool {
        self.0 == expected
    }
}
