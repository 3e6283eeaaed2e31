//! Session markers
//!
//! For every active product the shell session carries one
//! `SETUP_<PRODUCT>` variable whose value records how the setup was done:
//!
//! ```text
//! <product> <version> -f <flavor> -Z <stack-root> [-t <tag>] [-m <tablefile>]
//! ```
//!
//! The string format is an ABI shared with shell sessions created by other
//! implementations, so parsing is tolerant and formatting is exact.
//! Spaces in stack paths are encoded as `-+-`.

use camino::Utf8PathBuf;

use crate::product::{setup_env_name, LOCAL_VERSION_PREFIX};
use crate::{Error, Result};

const SPACE_ENCODING: &str = "-+-";

/// Encode a path for inclusion in a marker (spaces become `-+-`).
pub fn encode_path(path: &str) -> String {
    path.replace(' ', SPACE_ENCODING)
}

/// Reverse [`encode_path`].
pub fn decode_path(encoded: &str) -> String {
    encoded.replace(SPACE_ENCODING, " ")
}

/// A parsed `SETUP_<PRODUCT>` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMarker {
    pub product: String,
    pub version: String,
    pub flavor: Option<String>,
    pub stack_root: Option<Utf8PathBuf>,
    pub tag: Option<String>,
    pub table_file: Option<Utf8PathBuf>,
}

impl SessionMarker {
    pub fn new(product: &str, version: &str, flavor: &str, stack_root: Option<&str>) -> Self {
        SessionMarker {
            product: product.to_string(),
            version: version.to_string(),
            flavor: Some(flavor.to_string()),
            stack_root: stack_root.map(Utf8PathBuf::from),
            tag: None,
            table_file: None,
        }
    }

    /// True for `setup -r` products (version `LOCAL:<dir>`).
    pub fn is_local(&self) -> bool {
        self.version.starts_with(LOCAL_VERSION_PREFIX)
    }

    /// The environment variable this marker lives in.
    pub fn env_name(&self) -> String {
        setup_env_name(&self.product)
    }

    /// Render the marker value in the wire format.
    pub fn format(&self) -> String {
        let mut out = format!("{} {}", self.product, self.version);
        if let Some(flavor) = &self.flavor {
            out.push_str(&format!(" -f {flavor}"));
        }
        out.push_str(&format!(
            " -Z {}",
            self.stack_root
                .as_ref()
                .map(|p| encode_path(p.as_str()))
                .unwrap_or_else(|| "None".to_string())
        ));
        if let Some(tag) = &self.tag {
            out.push_str(&format!(" -t {tag}"));
        }
        if let Some(table) = &self.table_file {
            out.push_str(&format!(" -m {table}"));
        }
        out
    }

    /// Parse a marker value. `product` is the name implied by the variable
    /// name; a mismatched product field inside the value is tolerated with
    /// a warning (old and new implementations can disagree on case).
    pub fn parse(product: &str, value: &str) -> Result<SessionMarker> {
        let mut words = value.split_whitespace();
        let recorded = words.next().ok_or_else(|| Error::StateMismatch {
            product: product.to_string(),
            message: format!("empty SETUP value \"{value}\""),
        })?;
        if recorded != product {
            tracing::warn!(
                "product name {recorded} in SETUP variable does not match {product}"
            );
        }

        let mut marker = SessionMarker {
            product: product.to_string(),
            version: "setup".to_string(),
            flavor: None,
            stack_root: None,
            tag: None,
            table_file: None,
        };

        let mut words = words.peekable();
        if words.peek().is_some_and(|w| !w.starts_with('-')) {
            if let Some(version) = words.next() {
                marker.version = version.to_string();
            }
        }

        while let Some(flag) = words.next() {
            match flag {
                "-f" => marker.flavor = words.next().map(str::to_string),
                "-Z" | "-z" => {
                    marker.stack_root = words.next().map(|w| {
                        let decoded = decode_path(w);
                        Utf8PathBuf::from(decoded)
                    });
                }
                "-t" => marker.tag = words.next().map(str::to_string),
                "-m" => marker.table_file = words.next().map(Utf8PathBuf::from),
                other => {
                    return Err(Error::StateMismatch {
                        product: product.to_string(),
                        message: format!("unexpected token \"{other}\" in \"{value}\""),
                    });
                }
            }
        }

        if marker.stack_root.as_deref().map(|p| p.as_str()) == Some("None") {
            marker.stack_root = None;
        }

        Ok(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn test_round_trip() {
        let mut marker = SessionMarker::new("cfitsio", "3.450", "Linux64", Some("/opt/stack"));
        marker.tag = Some("current".to_string());
        let text = marker.format();
        assert_eq!(text, "cfitsio 3.450 -f Linux64 -Z /opt/stack -t current");

        let back = SessionMarker::parse("cfitsio", &text).unwrap();
        assert_eq!(back, marker);
    }

    #[test]
    fn test_encoded_spaces() {
        let marker = SessionMarker::new("foo", "1.0", "NULL", Some("/opt/my stack"));
        let text = marker.format();
        assert!(text.contains("/opt/my-+-stack"));
        let back = SessionMarker::parse("foo", &text).unwrap();
        assert_eq!(
            back.stack_root.as_deref(),
            Some(Utf8Path::new("/opt/my stack"))
        );
    }

    #[test]
    fn test_local_marker() {
        let marker = SessionMarker::new("foo", "LOCAL:/work/foo", "Linux64", None);
        assert!(marker.is_local());
        let back = SessionMarker::parse("foo", &marker.format()).unwrap();
        assert!(back.is_local());
        assert_eq!(back.stack_root, None);
    }

    #[test]
    fn test_tablefile_preserved() {
        let text = "foo 1.2 -f Linux64 -Z /opt/stack -m /tmp/foo.table";
        let back = SessionMarker::parse("foo", text).unwrap();
        assert_eq!(
            back.table_file.as_deref(),
            Some(Utf8Path::new("/tmp/foo.table"))
        );
        assert_eq!(back.format(), text);
    }

    #[test]
    fn test_bad_token_is_state_mismatch() {
        let err = SessionMarker::parse("foo", "foo 1.0 --what").unwrap_err();
        assert!(matches!(err, Error::StateMismatch { .. }));
    }
}
