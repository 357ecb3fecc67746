//! Canonical backup identifier codec.
//!
//! Every backup is named `<timestamp>-<account>` plus a fixed suffix:
//! `2025-10-22_042211-user@example.com.gemini` for an installed directory,
//! the same with `.tar.gz` appended for a compressed archive. The embedded
//! timestamp is the sole ordering key: identifiers are parsed into a
//! [`NaiveDateTime`] before comparison, never compared lexically.

use chrono::NaiveDateTime;

/// Suffix for installed directory backups.
pub const DIR_SUFFIX: &str = ".gemini";
/// Suffix for compressed archive backups.
pub const ARCHIVE_SUFFIX: &str = ".gemini.tar.gz";
/// Account token used when the active-account marker cannot be read.
pub const FALLBACK_ACCOUNT: &str = "gemini-backup";

/// strftime-style pattern for the timestamp token, e.g. `2025-10-22_042211`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";
/// Length of a formatted timestamp token.
const TIMESTAMP_LEN: usize = 17;

/// Format a timestamp as the identifier prefix `YYYY-MM-DD_HHMMSS`.
pub fn timestamp_token(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Sanitize an account identifier for use in a filename: path separators
/// and whitespace become `_`.
pub fn sanitize_account(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Directory backup name: `<timestamp>-<account>.gemini`.
pub fn dir_name(ts: NaiveDateTime, account: &str) -> String {
    format!("{}-{account}{DIR_SUFFIX}", timestamp_token(ts))
}

/// Archive backup name: `<timestamp>-<account>.gemini.tar.gz`.
pub fn archive_name(ts: NaiveDateTime, account: &str) -> String {
    format!("{}-{account}{ARCHIVE_SUFFIX}", timestamp_token(ts))
}

/// Stable "latest" pointer name for an account: `<account>.gemini`.
pub fn latest_link_name(account: &str) -> String {
    format!("{account}{DIR_SUFFIX}")
}

/// Decode the timestamp embedded in a backup name.
///
/// Returns `None` when the name does not match the fixed shape
/// `YYYY-MM-DD_HHMMSS-...`: a non-match means "not one of our backups",
/// never a fault, so callers skip such entries silently.
pub fn decode(name: &str) -> Option<NaiveDateTime> {
    let token = name.get(..TIMESTAMP_LEN)?;
    if name.as_bytes().get(TIMESTAMP_LEN) != Some(&b'-') {
        return None;
    }
    NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT).ok()
}

/// Whether a name carries the archive suffix.
pub fn is_archive_name(name: &str) -> bool {
    name.ends_with(ARCHIVE_SUFFIX)
}

/// Whether a name carries the directory suffix (and not the archive one).
pub fn is_dir_name(name: &str) -> bool {
    name.ends_with(DIR_SUFFIX) && !is_archive_name(name)
}
