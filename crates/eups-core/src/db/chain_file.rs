//! `*.chain` files
//!
//! A chain file records which version of a product a tag points at, per
//! flavor. The sectioning matches version files. The header still says
//! `FILE = version` for compatibility with old readers.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use super::{atomic_write, now_str, read_retrying, who};
use crate::{Error, Result};

/// One flavor's tag assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainInfo {
    pub version: String,
    pub declarer: Option<String>,
    pub declared: Option<String>,
    pub modifier: Option<String>,
    pub modified: Option<String>,
}

/// The parsed contents of one `<tag>.chain` file.
#[derive(Debug, Clone, Default)]
pub struct ChainFile {
    pub product: Option<String>,
    pub tag: Option<String>,
    /// Flavor name -> assignment
    pub info: BTreeMap<String, ChainInfo>,
}

impl ChainFile {
    /// Read a chain file; a missing file yields an empty record.
    pub fn read(path: &Utf8Path) -> Result<Self> {
        match read_retrying(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse chain-file content.
    pub fn parse(content: &str, path: &Utf8Path) -> Result<Self> {
        let mut out = ChainFile::default();
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

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim().to_lowercase(), v.trim().trim_matches('"').to_string()))
                .ok_or_else(|| {
                    Error::database(
                        format!("Unexpected line \"{line}\" at {path}:{}", idx + 1),
                        "chain files contain KEY = VALUE lines sectioned by FLAVOR",
                    )
                })?;

            match key.as_str() {
                "file" => {
                    if !matches!(value.to_lowercase().as_str(), "chain" | "version") {
                        return Err(Error::database(
                            format!("Expected \"File = chain\" in {path}, saw \"{value}\""),
                            "this does not look like a chain file",
                        ));
                    }
                }
                "product" => {
                    if out.product.is_none() {
                        out.product = Some(value);
                    }
                }
                "chain" => {
                    if out.tag.is_none() {
                        out.tag = Some(value);
                    }
                }
                "flavor" => {
                    out.info.entry(value.clone()).or_default();
                    flavor = Some(value);
                }
                "qualifiers" => {}
                other => {
                    let Some(info) = flavor.as_ref().and_then(|f| out.info.get_mut(f)) else {
                        continue;
                    };
                    match other {
                        "version" => info.version = value,
                        "declarer" => info.declarer = Some(value),
                        "declared" => info.declared = Some(value),
                        "modifier" => info.modifier = Some(value),
                        "modified" => info.modified = Some(value),
                        _ => {}
                    }
                }
            }
        }

        Ok(out)
    }

    /// The version this tag points at for a flavor, if assigned.
    pub fn version_for(&self, flavor: &str) -> Option<&str> {
        self.info.get(flavor).map(|i| i.version.as_str())
    }

    /// Assign the tag to a version for one flavor.
    pub fn set_version(&mut self, version: &str, flavor: &str) {
        let info = match self.info.get(flavor) {
            Some(prev) => ChainInfo {
                version: version.to_string(),
                declarer: prev.declarer.clone(),
                declared: prev.declared.clone(),
                modifier: Some(who()),
                modified: Some(now_str()),
            },
            None => ChainInfo {
                version: version.to_string(),
                declarer: Some(who()),
                declared: Some(now_str()),
                ..ChainInfo::default()
            },
        };
        self.info.insert(flavor.to_string(), info);
    }

    /// Drop the assignment for one flavor; true if anything was removed.
    pub fn remove_version(&mut self, flavor: &str) -> bool {
        self.info.remove(flavor).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Write back atomically; an empty record removes the file.
    pub fn write(&self, path: &Utf8Path) -> Result<()> {
        if self.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }

        // "FILE = version" kept for backward compatibility with old readers
        let mut out = format!(
            "FILE = version\nPRODUCT = {}\nCHAIN = {}\n#***************************************\n",
            self.product.as_deref().unwrap_or(""),
            self.tag.as_deref().unwrap_or(""),
        );

        for (flavor, info) in &self.info {
            out.push_str(&format!(
                "\n#Group:\n   FLAVOR = {flavor}\n   VERSION = {}\n   QUALIFIERS = \"\"\n",
                info.version
            ));
            for (field, value) in [
                ("DECLARER", &info.declarer),
                ("DECLARED", &info.declared),
                ("MODIFIER", &info.modifier),
                ("MODIFIED", &info.modified),
            ] {
                if let Some(value) = value {
                    out.push_str(&format!("   {field} = {value}\n"));
                }
            }
            out.push_str("#End:\n");
        }

        atomic_write(path, &out)
    }
}

/// The path of the chain file for (product dir, tag).
pub fn chain_file_path(product_dir: &Utf8Path, tag: &str) -> Utf8PathBuf {
    product_dir.join(format!("{tag}.{}", super::CHAIN_EXT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("current.chain")).unwrap();

        let mut cf = ChainFile {
            product: Some("cfitsio".to_string()),
            tag: Some("current".to_string()),
            ..ChainFile::default()
        };
        cf.set_version("3.450", "Linux64");
        cf.write(&path).unwrap();

        let back = ChainFile::read(&path).unwrap();
        assert_eq!(back.product.as_deref(), Some("cfitsio"));
        assert_eq!(back.tag.as_deref(), Some("current"));
        assert_eq!(back.version_for("Linux64"), Some("3.450"));
        assert_eq!(back.version_for("DarwinX86"), None);
    }

    #[test]
    fn test_retag_records_modifier() {
        let mut cf = ChainFile::default();
        cf.set_version("1.0", "Linux64");
        let declared = cf.info.get("Linux64").unwrap().declared.clone();
        cf.set_version("2.0", "Linux64");
        let info = cf.info.get("Linux64").unwrap();
        assert_eq!(info.version, "2.0");
        assert_eq!(info.declared, declared);
        assert!(info.modifier.is_some());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let cf = ChainFile::read(Utf8Path::new("/no/such/file.chain")).unwrap();
        assert!(cf.is_empty());
    }
}
