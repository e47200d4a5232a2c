//! Build-log manifest-URL block parsing.
//!
//! Publishing steps announce their manifests in the build log as a marker
//! line followed by one URL per line:
//!
//! ```text
//! Manifest urls:
//! https://drops.example.com/content/9f2ab1;Editor.Core.manifest
//! https://drops.example.com/content/c07d44;Editor.Lsp.manifest
//! ```

use regex::Regex;

use buildrelay_shared::error::{BuildRelayError, Result};

/// Locates and extracts manifest URLs from build log text.
#[derive(Debug, Clone)]
pub struct ManifestLocator {
    marker: String,
    extension: String,
    url_re: Regex,
}

impl ManifestLocator {
    /// Build a locator for the given marker line and manifest extension.
    pub fn new(marker: &str, extension: &str) -> Result<Self> {
        // Multi-line: each qualifying log line is captured independently.
        let pattern = format!(r"(?m)^https://\S+{}$", regex::escape(extension));
        let url_re = Regex::new(&pattern)
            .map_err(|e| BuildRelayError::config(format!("invalid manifest extension: {e}")))?;
        Ok(Self {
            marker: marker.to_string(),
            extension: extension.to_string(),
            url_re,
        })
    }

    /// The marker line this locator searches for.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The manifest file extension.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether any of `lines` contains the marker.
    pub fn lines_contain_marker(&self, lines: &[String]) -> bool {
        lines.iter().any(|l| l.contains(&self.marker))
    }

    /// Extract all manifest URLs announced after the first marker occurrence.
    ///
    /// A missing marker and an empty URL list are both hard errors: a build
    /// that published no manifests cannot be inserted.
    pub fn manifest_urls(&self, log_text: &str) -> Result<Vec<String>> {
        let marker_at = log_text.find(&self.marker).ok_or_else(|| {
            BuildRelayError::upstream(format!(
                "marker '{}' not found in build log",
                self.marker
            ))
        })?;

        let tail = &log_text[marker_at + self.marker.len()..];
        let urls: Vec<String> = self
            .url_re
            .find_iter(tail)
            .map(|m| m.as_str().trim().to_string())
            .collect();

        if urls.is_empty() {
            return Err(BuildRelayError::upstream(format!(
                "no manifest URLs found after marker '{}'",
                self.marker
            )));
        }

        Ok(urls)
    }

    /// The manifest file name: the URL's trailing segment after the last `;`,
    /// e.g. `Editor.Core.manifest` from
    /// `https://drops.example.com/content/9f2ab1;Editor.Core.manifest`.
    pub fn file_name(&self, url: &str) -> Result<String> {
        let segment = url.rsplit(';').next().unwrap_or(url);
        if segment.is_empty() || !segment.ends_with(&self.extension) {
            return Err(BuildRelayError::upstream(format!(
                "manifest URL '{url}' has no '{}' file segment",
                self.extension
            )));
        }
        Ok(segment.to_string())
    }

    /// The component name: the file name with the extension stripped.
    pub fn component_name(&self, file_name: &str) -> String {
        file_name
            .strip_suffix(&self.extension)
            .unwrap_or(file_name)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> ManifestLocator {
        ManifestLocator::new("Manifest urls:", ".manifest").unwrap()
    }

    const LOG: &str = "\
2026-03-15T10:01:02 Restoring packages
2026-03-15T10:05:40 Publishing drop
Manifest urls:
https://drops.example.com/content/9f2ab1;Editor.Core.manifest
https://drops.example.com/content/c07d44;Editor.Lsp.manifest
2026-03-15T10:06:01 Done
";

    #[test]
    fn extracts_urls_after_marker() {
        let urls = locator().manifest_urls(LOG).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(
            urls[0],
            "https://drops.example.com/content/9f2ab1;Editor.Core.manifest"
        );
    }

    #[test]
    fn urls_before_marker_are_ignored() {
        let log = format!(
            "https://drops.example.com/content/early;Stray.manifest\n{LOG}"
        );
        let urls = locator().manifest_urls(&log).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(!urls.iter().any(|u| u.contains("Stray")));
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = locator()
            .manifest_urls("no announcements in this log")
            .unwrap_err();
        assert!(err.to_string().contains("Manifest urls:"));
    }

    #[test]
    fn marker_with_no_urls_is_an_error() {
        let err = locator()
            .manifest_urls("Manifest urls:\nnothing published today\n")
            .unwrap_err();
        assert!(err.to_string().contains("no manifest URLs"));
    }

    #[test]
    fn non_manifest_lines_are_skipped() {
        let log = "\
Manifest urls:
https://drops.example.com/content/9f2ab1;Editor.Core.manifest
https://drops.example.com/logs/build.txt
http://insecure.example.com/content/x;Bad.manifest
";
        let urls = locator().manifest_urls(log).unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn file_name_is_segment_after_last_semicolon() {
        let loc = locator();
        let name = loc
            .file_name("https://drops.example.com/content/9f2ab1;Editor.Core.manifest")
            .unwrap();
        assert_eq!(name, "Editor.Core.manifest");
        assert_eq!(loc.component_name(&name), "Editor.Core");
    }

    #[test]
    fn file_name_rejects_urls_without_manifest_segment() {
        assert!(locator()
            .file_name("https://drops.example.com/content/9f2ab1")
            .is_err());
    }
}
