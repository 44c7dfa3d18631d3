//! Utility functions for path manipulation.

use camino::Utf8PathBuf;

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If the `HOME` environment variable is not set, the function returns the
/// input string unchanged (i.e., the leading `~` is not expanded).
///
/// # Examples
///
/// ```
/// # use bravetools::exec::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.bravetools/images"), format!("{home}/.bravetools/images"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Returns the user's home directory from `HOME`, when set and UTF-8.
#[must_use]
pub fn home_dir() -> Option<Utf8PathBuf> {
    std::env::var_os("HOME")
        .and_then(|home| home.into_string().ok())
        .filter(|home| !home.trim().is_empty())
        .map(Utf8PathBuf::from)
}
