// Textual listing format exchanged in LIST_SERVER_RES.
//
// One line per file:
//   <name>\t<size> bytes\tmtime:<YYYY-MM-DD HH:MM:SS>\tatime:<...>\tctime:<...>\n
//
// The reconciler only needs `\t<size> bytes\t` as an anchor to recover name
// and size; the timestamp fields are
// informational and are not required to round-trip through the parser.

use crate::model::filename::Filename;
use chrono::{DateTime, Local};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: Filename,
    pub size: u64,
    pub mtime: SystemTime,
    pub atime: SystemTime,
    pub ctime: SystemTime,
}

fn format_time(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_entry(entry: &FileEntry) -> String {
    format!(
        "{}\t{} bytes\tmtime:{}\tatime:{}\tctime:{}\n",
        entry.name,
        entry.size,
        format_time(entry.mtime),
        format_time(entry.atime),
        format_time(entry.ctime),
    )
}

pub fn format_listing(entries: &[FileEntry]) -> String {
    entries.iter().map(format_entry).collect()
}

/// One entry recovered from a listing: only `name` and `size` are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub name: String,
    pub size: u64,
}

/// Parses the textual listing, extracting `(name, size)` pairs via the
/// `\t<size> bytes\t` anchor. Malformed lines are skipped rather than
/// failing the whole listing, since a stray line shouldn't block
/// reconciliation of everything else.
pub fn parse_listing(text: &str) -> Vec<ListedFile> {
    const ANCHOR_SUFFIX: &str = " bytes\t";

    text.lines()
        .filter_map(|line| {
            let tab = line.find('\t')?;
            let name = &line[..tab];
            let rest = &line[tab + 1..];
            let anchor = rest.find(ANCHOR_SUFFIX)?;
            let size: u64 = rest[..anchor].parse().ok()?;
            Some(ListedFile { name: name.to_string(), size })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> FileEntry {
        FileEntry {
            name: Filename::parse(name).unwrap(),
            size,
            mtime: SystemTime::UNIX_EPOCH,
            atime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn formats_and_parses_single_entry() {
        let text = format_listing(&[entry("hello.txt", 3)]);
        let parsed = parse_listing(&text);
        assert_eq!(parsed, vec![ListedFile { name: "hello.txt".to_string(), size: 3 }]);
    }

    #[test]
    fn lists_exactly_one_line_per_file() {
        let entries = vec![entry("a.bin", 8192), entry("b.txt", 0)];
        let text = format_listing(&entries);
        assert_eq!(text.lines().count(), 2);
        let parsed = parse_listing(&text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].size, 8192);
        assert_eq!(parsed[1].size, 0);
    }

    #[test]
    fn skips_malformed_lines() {
        let parsed = parse_listing("not a valid listing line\n");
        assert!(parsed.is_empty());
    }
}
