use std::cmp::Ordering;

use crate::listing::DirectoryEntry;

/// Listing order requested through the `sortBy` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    SizeDesc,
    Time,
    TimeDesc,
}

impl SortKey {
    /// Unknown or missing values fall back to name order.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("size") => SortKey::Size,
            Some("size_desc") => SortKey::SizeDesc,
            Some("time") => SortKey::Time,
            Some("time_desc") => SortKey::TimeDesc,
            _ => SortKey::Name,
        }
    }

    pub fn as_param(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::SizeDesc => "size_desc",
            SortKey::Time => "time",
            SortKey::TimeDesc => "time_desc",
        }
    }

    /// Compare two entries of the same kind.
    fn compare(&self, a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
        match self {
            // Size means nothing for directories.
            SortKey::Size | SortKey::SizeDesc if a.is_dir => a.name.cmp(&b.name),
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::SizeDesc => b.size.cmp(&a.size),
            SortKey::Time => a.modified.cmp(&b.modified),
            SortKey::TimeDesc => b.modified.cmp(&a.modified),
            SortKey::Name => a.name.cmp(&b.name),
        }
    }
}

/// Sort entries in place: directories first, then files, each group ordered
/// by `key`. The sort is stable, so equal entries keep their input order.
pub fn sort_entries(entries: &mut [DirectoryEntry], key: SortKey) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => key.compare(a, b),
    });
}
