//! Directory listing parser
//!
//! FTP `LIST` output is not standardized. Two dialects cover the servers seen
//! in practice: the `ls -l` layout of Unix daemons and the `MM-DD-YY hh:mmAM`
//! layout of IIS. A line that fits neither is a hard error; silently dropping
//! it would make folders look empty and recursive deletes stop early.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::providers::ProviderError;

static UNIX_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<kind>[-dl])(?:[-r][-w][-xsStT]){3}[+@.]?\s+\d+\s+\S+(?:\s+\S+)?\s+(?P<size>\d+)\s+(?P<modified>[A-Za-z]{3}\s+\d{1,2}\s+(?:\d{4}|\d{1,2}:\d{2}))\s+(?P<name>.+?)\s*$",
    )
    .expect("UNIX_LINE_RE")
});

static DOS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<modified>\d{2}-\d{2}-(?:\d{4}|\d{2})\s+\d{1,2}:\d{2}\s*[AaPp][Mm])\s+(?:(?P<dir><DIR>)|(?P<size>\d+))\s+(?P<name>.+?)\s*$",
    )
    .expect("DOS_LINE_RE")
});

/// One parsed listing line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_file: bool,
    /// Bytes; always 0 for directories
    pub size: u64,
    pub modified: NaiveDateTime,
}

/// Parse one raw `LIST` line.
///
/// Returns `Ok(None)` for the `.` and `..` self-references.
pub fn parse_line(line: &str) -> Result<Option<ListingEntry>, ProviderError> {
    let entry = if let Some(caps) = UNIX_LINE_RE.captures(line) {
        let is_file = &caps["kind"] != "d";
        let mut name = caps["name"].to_string();
        if &caps["kind"] == "l" {
            if let Some((link, _target)) = name.split_once(" -> ") {
                name = link.to_string();
            }
        }
        ListingEntry {
            is_file,
            size: if is_file { caps["size"].parse().unwrap_or(0) } else { 0 },
            modified: parse_unix_stamp(&caps["modified"]),
            name,
        }
    } else if let Some(caps) = DOS_LINE_RE.captures(line) {
        let is_file = caps.name("dir").is_none();
        let size = match caps.name("size") {
            Some(size) if is_file => size.as_str().parse().unwrap_or(0),
            _ => 0,
        };
        ListingEntry {
            is_file,
            size,
            modified: parse_dos_stamp(&caps["modified"]),
            name: caps["name"].to_string(),
        }
    } else {
        return Err(ProviderError::UnsupportedListing(line.to_string()));
    };

    if entry.name == "." || entry.name == ".." {
        return Ok(None);
    }
    Ok(Some(entry))
}

/// Parse a whole listing, skipping blank lines and the `total N` header
pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Result<Vec<ListingEntry>, ProviderError> {
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || is_total_line(line) {
            continue;
        }
        if let Some(entry) = parse_line(line)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn is_total_line(line: &str) -> bool {
    line.strip_prefix("total ")
        .is_some_and(|rest| rest.trim().chars().all(|c| c.is_ascii_digit()))
}

fn fallback_stamp() -> NaiveDateTime {
    DateTime::UNIX_EPOCH.naive_utc()
}

/// `Jan 20 10:00` (most recent such date, at most a day ahead of now) or
/// `Jan 20 2024`
fn parse_unix_stamp(stamp: &str) -> NaiveDateTime {
    unix_stamp_at(stamp, Local::now().naive_local())
}

fn unix_stamp_at(stamp: &str, now: NaiveDateTime) -> NaiveDateTime {
    let stamp = stamp.split_whitespace().collect::<Vec<_>>().join(" ");

    if stamp.contains(':') {
        // Feb 29 only parses in a leap year, so look back up to four years
        (0..4)
            .filter_map(|back| {
                let year = now.year() - back;
                NaiveDateTime::parse_from_str(&format!("{} {}", stamp, year), "%b %d %H:%M %Y").ok()
            })
            .find(|parsed| *parsed <= now + chrono::Duration::days(1))
            .unwrap_or_else(fallback_stamp)
    } else {
        NaiveDate::parse_from_str(&stamp, "%b %d %Y")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_else(fallback_stamp)
    }
}

/// `01-20-26  10:00AM` or `01-20-2026 10:00 PM`
fn parse_dos_stamp(stamp: &str) -> NaiveDateTime {
    let mut parts = stamp.split_whitespace();
    let date = parts.next().unwrap_or_default();
    let time = parts.collect::<String>().to_uppercase();
    let format = if date.len() == 10 { "%m-%d-%Y %I:%M%p" } else { "%m-%d-%y %I:%M%p" };
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), format).unwrap_or_else(|_| fallback_stamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_unix_file_line() {
        let entry = parse_line("-rw-r--r--    1 ftp      ftp         12345 Jan 20  2024 report final.pdf")
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "report final.pdf");
        assert!(entry.is_file);
        assert_eq!(entry.size, 12345);
        assert_eq!(entry.modified.date(), NaiveDate::from_ymd_opt(2024, 1, 20).unwrap());
    }

    #[test]
    fn test_unix_directory_size_is_zero() {
        let entry = parse_line("drwxr-xr-x    2 owner    group        4096 Mar  3 14:05 Projects")
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "Projects");
        assert!(!entry.is_file);
        assert_eq!(entry.size, 0);
        assert_eq!((entry.modified.hour(), entry.modified.minute()), (14, 5));
    }

    #[test]
    fn test_unix_line_without_group() {
        let entry = parse_line("-rw-r--r-- 1 ftp 42 Dec 31 2023 notes.txt").unwrap().unwrap();
        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.size, 42);
    }

    #[test]
    fn test_year_less_stamps_resolve_to_the_past() {
        let at = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap();

        // leap day seen from a non-leap year
        let leap = unix_stamp_at("Feb 29 10:00", at(2027, 3, 1));
        assert_eq!(leap.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(leap.hour(), 10);

        let december = unix_stamp_at("Dec 31 23:59", at(2026, 1, 10));
        assert_eq!(december.date(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

        let today = unix_stamp_at("Mar  3 14:05", at(2026, 3, 3));
        assert_eq!(today.date(), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn test_unix_symlink_keeps_link_name() {
        let entry = parse_line("lrwxrwxrwx    1 ftp      ftp            11 Jan 01  2024 current -> releases/v2")
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "current");
        assert!(entry.is_file);
    }

    #[test]
    fn test_self_references_are_skipped() {
        assert!(parse_line("drwxr-xr-x    2 ftp      ftp          4096 Jan 01 10:00 .").unwrap().is_none());
        assert!(parse_line("drwxr-xr-x    2 ftp      ftp          4096 Jan 01 10:00 ..").unwrap().is_none());
        // hidden files are real entries
        assert!(parse_line("-rw-r--r--    1 ftp      ftp             1 Jan 01 10:00 .htaccess").unwrap().is_some());
    }

    #[test]
    fn test_dos_lines() {
        let dir = parse_line("01-20-26  10:00AM       <DIR>          My Documents").unwrap().unwrap();
        assert_eq!(dir.name, "My Documents");
        assert!(!dir.is_file);
        assert_eq!(dir.size, 0);
        assert_eq!(dir.modified.date(), NaiveDate::from_ymd_opt(2026, 1, 20).unwrap());

        let file = parse_line("12-05-2023  03:15PM                 2048 setup.exe").unwrap().unwrap();
        assert_eq!(file.name, "setup.exe");
        assert!(file.is_file);
        assert_eq!(file.size, 2048);
        assert_eq!(file.modified.hour(), 15);
    }

    #[test]
    fn test_unknown_format_is_fatal() {
        let err = parse_line("type=file;size=10; odd.txt").unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedListing(line) if line.contains("odd.txt")));
    }

    #[test]
    fn test_parse_listing_skips_total_and_blank_lines() {
        let lines = vec![
            "total 8".to_string(),
            "".to_string(),
            "-rw-r--r--    1 ftp      ftp             5 Jan 01  2024 a.txt\r".to_string(),
            "drwxr-xr-x    2 ftp      ftp          4096 Jan 01  2024 b".to_string(),
        ];
        let entries = parse_listing(&lines).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[1].name, "b");
    }
}
