//! Output file naming and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::Result;

const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingOptions {
    /// Prefix the file name with the tour date.
    pub add_date: bool,
    /// `0` names files by id only, a negative value keeps the whole title.
    pub max_title_length: i64,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            add_date: false,
            max_title_length: -1,
        }
    }
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

/// `[<date>_]<title>-<id>.gpx`, or `[<date>_]<id>.gpx` when titles are disabled.
pub fn gpx_file_name(
    tour_id: &str,
    title: &str,
    date: Option<OffsetDateTime>,
    options: &NamingOptions,
) -> String {
    let date_prefix = match date {
        Some(date) if options.add_date => format!("{}_", date.date()),
        _ => String::new(),
    };

    let title = sanitize_filename(title);
    let stem = match usize::try_from(options.max_title_length) {
        Ok(0) => tour_id.to_string(),
        Ok(max) => {
            let cropped: String = title.chars().take(max).collect();
            format!("{cropped}-{tour_id}")
        }
        Err(_) => format!("{title}-{tour_id}"),
    };

    format!("{date_prefix}{stem}.gpx")
}

pub fn gpx_path(
    output_dir: &Path,
    tour_id: &str,
    title: &str,
    date: Option<OffsetDateTime>,
    options: &NamingOptions,
) -> PathBuf {
    output_dir.join(gpx_file_name(tour_id, title, date, options))
}

/// Writes a fully rendered document in one call.
pub fn write_document(path: &Path, document: &str) -> Result<()> {
    fs::write(path, document)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(r#"A/B: "C" <d>|e?*\"#), "AB C de");
        assert_eq!(sanitize_filename("Plain name"), "Plain name");
    }

    #[test]
    fn test_gpx_file_name() {
        let date = Some(datetime!(2022-01-02 23:30:00 +01:00));
        let plain = NamingOptions::default();
        assert_eq!(gpx_file_name("42", "Lake/Loop", date, &plain), "LakeLoop-42.gpx");

        let dated = NamingOptions {
            add_date: true,
            ..plain
        };
        assert_eq!(gpx_file_name("42", "Lake", date, &dated), "2022-01-02_Lake-42.gpx");
        assert_eq!(gpx_file_name("42", "Lake", None, &dated), "Lake-42.gpx");

        let id_only = NamingOptions {
            max_title_length: 0,
            ..plain
        };
        assert_eq!(gpx_file_name("42", "Lake", date, &id_only), "42.gpx");

        let cropped = NamingOptions {
            max_title_length: 3,
            ..plain
        };
        assert_eq!(gpx_file_name("42", "Lakeside", date, &cropped), "Lak-42.gpx");
        assert_eq!(gpx_file_name("42", "La", date, &cropped), "La-42.gpx");
    }

    #[test]
    fn test_write_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = gpx_path(dir.path(), "7", "Run", None, &NamingOptions::default());
        write_document(&path, "<gpx/>").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("Run-7.gpx")).unwrap(), "<gpx/>");
    }
}
