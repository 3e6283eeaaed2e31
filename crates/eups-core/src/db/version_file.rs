//! `*.version` files
//!
//! A version file holds the declaration data for one (product, version)
//! across all declared flavors. Sections are keyed by `FLAVOR = <name>`;
//! keys are case-insensitive, `#` starts a comment, values may be quoted.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use super::{atomic_write, now_str, read_retrying, who};
use crate::product::NONE_PATH;
use crate::{Error, Result};

/// Per-flavor declaration data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorInfo {
    /// Installation directory (`none` stored as the literal)
    pub prod_dir: Option<String>,
    /// Directory holding the table file, relative to prod_dir
    pub ups_dir: Option<String>,
    /// Table file, relative to ups_dir
    pub table_file: Option<String>,
    pub declarer: Option<String>,
    pub declared: Option<String>,
    pub modifier: Option<String>,
    pub modified: Option<String>,
}

/// The parsed contents of one `<version>.version` file.
#[derive(Debug, Clone, Default)]
pub struct VersionFile {
    pub product: Option<String>,
    pub version: Option<String>,
    /// Flavor name -> declaration data, in sorted order for stable writes
    pub info: BTreeMap<String, FlavorInfo>,
}

impl VersionFile {
    /// Read a version file from disk. A missing file yields an empty record.
    pub fn read(path: &Utf8Path) -> Result<Self> {
        match read_retrying(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse version-file content.
    pub fn parse(content: &str, path: &Utf8Path) -> Result<Self> {
        let mut out = VersionFile::default();
        let mut flavor: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let lower = line.to_lowercase();
            if lower.starts_with("group") || lower.starts_with("end") {
                continue;
            }

            let (key, value) = split_key_value(line).ok_or_else(|| {
                Error::database(
                    format!("Unexpected line \"{line}\" at {path}:{}", idx + 1),
                    "version files contain KEY = VALUE lines sectioned by FLAVOR",
                )
            })?;

            match key.as_str() {
                "file" => {
                    if !value.eq_ignore_ascii_case("version") {
                        return Err(Error::database(
                            format!("Expected \"File = version\" in {path}, saw \"{value}\""),
                            "this does not look like a version file",
                        ));
                    }
                }
                "product" => {
                    if out.product.is_none() {
                        out.product = Some(value);
                    }
                }
                "version" => {
                    if out.version.is_none() {
                        out.version = Some(value);
                    }
                }
                "flavor" => {
                    out.info.entry(value.clone()).or_default();
                    flavor = Some(value);
                }
                "qualifiers" => {} // legacy; always empty in practice
                other => {
                    let info = match flavor.as_ref().and_then(|f| out.info.get_mut(f)) {
                        Some(info) => info,
                        None => {
                            return Err(Error::database(
                                format!("{path}:{}: \"{line}\" appears before any FLAVOR", idx + 1),
                                "each KEY = VALUE body line belongs to a FLAVOR section",
                            ));
                        }
                    };
                    match other {
                        "prod_dir" => info.prod_dir = Some(value),
                        "ups_dir" => info.ups_dir = Some(value),
                        "table_file" => info.table_file = Some(value),
                        "declarer" => info.declarer = Some(value),
                        "declared" => info.declared = Some(value),
                        "modifier" => info.modifier = Some(value),
                        "modified" => info.modified = Some(value),
                        _ => {} // unknown keys are preserved nowhere but tolerated
                    }
                }
            }
        }

        Ok(out)
    }

    pub fn has_flavor(&self, flavor: &str) -> bool {
        self.info.contains_key(flavor)
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Add or update one flavor's declaration.
    pub fn add_flavor(
        &mut self,
        flavor: &str,
        prod_dir: Option<&str>,
        ups_dir: Option<&str>,
        table_file: Option<&str>,
    ) {
        let existing = self.info.get(flavor).cloned();
        let mut info = FlavorInfo {
            prod_dir: prod_dir
                .map(|d| d.trim_end_matches('/').to_string())
                .or_else(|| existing.as_ref().and_then(|e| e.prod_dir.clone()))
                .or_else(|| Some(NONE_PATH.to_string())),
            ups_dir: ups_dir
                .map(str::to_string)
                .or_else(|| existing.as_ref().and_then(|e| e.ups_dir.clone()))
                .or_else(|| Some("ups".to_string())),
            table_file: table_file
                .map(str::to_string)
                .or_else(|| existing.as_ref().and_then(|e| e.table_file.clone()))
                .or_else(|| Some(NONE_PATH.to_string())),
            ..FlavorInfo::default()
        };

        match existing {
            Some(prev) if prev.declarer.is_some() || prev.declared.is_some() => {
                info.declarer = prev.declarer;
                info.declared = prev.declared;
                info.modifier = Some(who());
                info.modified = Some(now_str());
            }
            _ => {
                info.declarer = Some(who());
                info.declared = Some(now_str());
            }
        }

        self.info.insert(flavor.to_string(), info);
    }

    /// Remove one flavor's declaration; true if anything was removed.
    pub fn remove_flavor(&mut self, flavor: &str) -> bool {
        self.info.remove(flavor).is_some()
    }

    /// Write the file back to disk atomically. An empty record removes the
    /// file instead.
    pub fn write(&self, path: &Utf8Path) -> Result<()> {
        if self.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }

        let mut out = format!(
            "FILE = version\nPRODUCT = {}\nVERSION = {}\n#***************************************\n",
            self.product.as_deref().unwrap_or(""),
            self.version.as_deref().unwrap_or(""),
        );

        for (flavor, info) in &self.info {
            out.push_str(&format!("\nGroup:\n   FLAVOR = {flavor}\n   QUALIFIERS = \"\"\n"));
            for (field, value) in [
                ("DECLARER", &info.declarer),
                ("DECLARED", &info.declared),
                ("MODIFIER", &info.modifier),
                ("MODIFIED", &info.modified),
                ("PROD_DIR", &info.prod_dir),
                ("UPS_DIR", &info.ups_dir),
                ("TABLE_FILE", &info.table_file),
            ] {
                if let Some(value) = value {
                    out.push_str(&format!("   {field} = {value}\n"));
                }
            }
        }
        out.push_str("End:\n");

        atomic_write(path, &out)
    }
}

/// The path of the version file for (product dir, version).
pub fn version_file_path(product_dir: &Utf8Path, version: &str) -> Utf8PathBuf {
    product_dir.join(format!("{version}.{}", super::VERSION_EXT))
}

/// `KEY = VALUE` with the key lowercased and surrounding quotes stripped
/// from the value.
fn split_key_value(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim().to_lowercase();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let value = value.trim().trim_matches('"').to_string();
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"FILE = version
PRODUCT = cfitsio
VERSION = 3.450
#***************************************

Group:
   FLAVOR = Linux64
   QUALIFIERS = ""
   DECLARER = rhl
   DECLARED = Thu Oct  4 10:12:45 2018 +0000
   PROD_DIR = cfitsio/3.450
   UPS_DIR = ups
   TABLE_FILE = cfitsio.table
End:
"#;

    #[test]
    fn test_parse_sample() {
        let vf = VersionFile::parse(SAMPLE, Utf8Path::new("3.450.version")).unwrap();
        assert_eq!(vf.product.as_deref(), Some("cfitsio"));
        assert_eq!(vf.version.as_deref(), Some("3.450"));
        let info = vf.info.get("Linux64").unwrap();
        assert_eq!(info.prod_dir.as_deref(), Some("cfitsio/3.450"));
        assert_eq!(info.table_file.as_deref(), Some("cfitsio.table"));
        assert_eq!(info.declarer.as_deref(), Some("rhl"));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("3.450.version")).unwrap();

        let mut vf = VersionFile {
            product: Some("cfitsio".to_string()),
            version: Some("3.450".to_string()),
            ..VersionFile::default()
        };
        vf.add_flavor("Linux64", Some("cfitsio/3.450"), Some("ups"), Some("cfitsio.table"));
        vf.write(&path).unwrap();

        let back = VersionFile::read(&path).unwrap();
        assert_eq!(back.product.as_deref(), Some("cfitsio"));
        let info = back.info.get("Linux64").unwrap();
        assert_eq!(info.prod_dir.as_deref(), Some("cfitsio/3.450"));
        assert!(info.declared.is_some());
    }

    #[test]
    fn test_empty_write_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("1.0.version")).unwrap();
        std::fs::write(&path, SAMPLE).unwrap();

        let mut vf = VersionFile::read(&path).unwrap();
        assert!(vf.remove_flavor("Linux64"));
        vf.write(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_modification_keeps_declarer() {
        let mut vf = VersionFile::parse(SAMPLE, Utf8Path::new("x")).unwrap();
        vf.add_flavor("Linux64", Some("cfitsio/3.450b"), None, None);
        let info = vf.info.get("Linux64").unwrap();
        assert_eq!(info.declarer.as_deref(), Some("rhl"));
        assert!(info.modifier.is_some());
        assert_eq!(info.prod_dir.as_deref(), Some("cfitsio/3.450b"));
    }
}
