//! Per-stack database operations
//!
//! One [`Database`] fronts the `ups_db/` directory of a single stack, plus
//! an optional per-user overlay directory holding user-scope chain files.
//! Lookups are lock-free; mutations take the stack's advisory lock and
//! write through temp-file + rename.

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use super::chain_file::{chain_file_path, ChainFile};
use super::lock::DbLock;
use super::version_file::{version_file_path, VersionFile};
use super::{CHAIN_EXT, UPS_DB, VERSION_EXT};
use crate::product::{self, Product};
use crate::{flavor, Error, Result};

/// Tags that live in the stack itself; everything else is user scope.
pub const GLOBAL_TAGS: &[&str] = &["current", "stable", "beta", "latest"];

/// How many times writers retry the advisory lock before LockBusy.
const LOCK_RETRIES: u32 = 5;

/// A single stack's product database.
#[derive(Debug, Clone)]
pub struct Database {
    /// The stack root (the directory containing `ups_db/`)
    pub stack_root: Utf8PathBuf,
    /// The `ups_db` directory itself
    pub path: Utf8PathBuf,
    /// Per-user overlay holding user-scope chain files, if available
    pub user_tag_root: Option<Utf8PathBuf>,
    /// Whether writers take the advisory lock
    pub locking_enabled: bool,
    /// Lock retries before giving up with a lock-busy error
    pub lock_retries: u32,
}

impl Database {
    /// Open the database of a stack. `user_tag_root` is the per-user
    /// directory that overlays this stack's tags (usually
    /// `~/.eups/ups_db/<stack-id>`).
    pub fn new(stack_root: &Utf8Path, user_tag_root: Option<Utf8PathBuf>) -> Database {
        Database {
            stack_root: stack_root.to_path_buf(),
            path: stack_root.join(UPS_DB),
            user_tag_root,
            locking_enabled: true,
            lock_retries: LOCK_RETRIES,
        }
    }

    /// The writer lock for this stack, or None when locking is disabled.
    fn lock(&self) -> Result<Option<DbLock>> {
        if !self.locking_enabled {
            return Ok(None);
        }
        DbLock::acquire(&self.path, self.lock_retries).map(Some)
    }

    fn product_dir(&self, product: &str) -> Utf8PathBuf {
        self.path.join(product)
    }

    /// Is a tag name user scope? The `user:` prefix forces it; otherwise
    /// anything not in the global set is a user tag.
    pub fn is_user_tag(tag: &str) -> bool {
        tag.strip_prefix("user:").is_some() || !GLOBAL_TAGS.contains(&tag)
    }

    /// All declared versions of a product, in no particular order.
    pub fn versions_of(&self, product: &str) -> Vec<String> {
        let mut out = Vec::new();
        let dir = self.product_dir(product);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return out;
        };
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(version) = name.strip_suffix(&format!(".{VERSION_EXT}")) {
                if !version.is_empty() {
                    out.push(version.to_string());
                }
            }
        }
        out
    }

    /// Find one declared (product, version) for a flavor, resolving paths.
    ///
    /// Flavor sections are tried exact first, then `ANY`, then `NULL`.
    pub fn find_version(&self, product: &str, version: &str, flavor: &str) -> Result<Product> {
        let vfile = version_file_path(&self.product_dir(product), version);
        if !vfile.exists() {
            return if self.versions_of(product).is_empty() && !self.product_dir(product).is_dir() {
                Err(Error::no_such_product(product))
            } else {
                Err(Error::NoSuchVersion {
                    product: product.to_string(),
                    version: version.to_string(),
                })
            };
        }

        let parsed = VersionFile::read(&vfile)?;
        let section = parsed
            .info
            .iter()
            .filter_map(|(declared, info)| {
                flavor::match_rank(declared, flavor).map(|rank| (rank, declared, info))
            })
            .min_by_key(|(rank, _, _)| *rank);

        let Some((_, declared_flavor, info)) = section else {
            return Err(Error::NoMatchingFlavor {
                product: product.to_string(),
                version: version.to_string(),
                flavor: flavor.to_string(),
            });
        };

        let (dir, table_file) = product::resolve_paths(
            &self.stack_root,
            info.prod_dir.as_deref(),
            info.ups_dir.as_deref(),
            info.table_file.as_deref(),
        );

        Ok(Product {
            name: product.to_string(),
            version: version.to_string(),
            flavor: declared_flavor.clone(),
            dir,
            table_file,
            stack_root: Some(self.stack_root.clone()),
            tags: self.tags_for(product, version, flavor),
        })
    }

    /// The version a tag points at, for a flavor. User-scope chain files
    /// overlay global ones.
    pub fn resolve_tag(&self, product: &str, tag: &str, flavor: &str) -> Option<String> {
        let tag = tag.strip_prefix("user:").unwrap_or(tag);
        for dir in self.chain_dirs() {
            let path = chain_file_path(&dir.join(product), tag);
            let Ok(chain) = ChainFile::read(&path) else {
                continue;
            };
            for try_flavor in flavor::fallback_flavors(flavor) {
                if let Some(version) = chain
                    .info
                    .iter()
                    .filter_map(|(declared, info)| {
                        flavor::match_rank(declared, &try_flavor).map(|rank| (rank, info))
                    })
                    .min_by_key(|(rank, _)| *rank)
                    .map(|(_, info)| info.version.clone())
                {
                    return Some(version);
                }
            }
        }
        None
    }

    /// All tags pointing at (product, version) for a flavor, user scope
    /// first, each scope sorted.
    pub fn tags_for(&self, product: &str, version: &str, flavor: &str) -> Vec<String> {
        let mut out = Vec::new();
        for (idx, dir) in self.chain_dirs().into_iter().enumerate() {
            let pdir = dir.join(product);
            let Ok(entries) = std::fs::read_dir(&pdir) else {
                continue;
            };
            let mut scope = Vec::new();
            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let Some(tag) = name.strip_suffix(&format!(".{CHAIN_EXT}")) else {
                    continue;
                };
                let Ok(chain) = ChainFile::read(&chain_file_path(&pdir, tag)) else {
                    continue;
                };
                let matches = chain
                    .info
                    .iter()
                    .any(|(f, info)| flavor::matches(f, flavor) && info.version == version);
                if matches {
                    // user scope is the overlay directory, listed first
                    if idx == 0 && self.user_tag_root.is_some() {
                        scope.push(format!("user:{tag}"));
                    } else {
                        scope.push(tag.to_string());
                    }
                }
            }
            scope.sort();
            out.extend(scope);
        }
        out
    }

    /// Chain-file roots in overlay order: user first, then the stack.
    fn chain_dirs(&self) -> Vec<Utf8PathBuf> {
        let mut dirs = Vec::new();
        if let Some(user) = &self.user_tag_root {
            dirs.push(user.clone());
        }
        dirs.push(self.path.clone());
        dirs
    }

    /// Declare a (product, version, flavor). Fails with an
    /// already-declared error when the flavor exists with different paths;
    /// redeclaring identical data is a no-op.
    pub fn declare(
        &self,
        product: &str,
        version: &str,
        flavor: &str,
        prod_dir: Option<&str>,
        ups_dir: Option<&str>,
        table_file: Option<&str>,
        tags: &[String],
    ) -> Result<()> {
        product::validate_name(product)?;
        let _lock = self.lock()?;

        let vfile = version_file_path(&self.product_dir(product), version);
        let mut parsed = VersionFile::read(&vfile)?;
        parsed.product.get_or_insert_with(|| product.to_string());
        parsed.version.get_or_insert_with(|| version.to_string());

        if let Some(existing) = parsed.info.get(flavor) {
            let same = existing.prod_dir.as_deref() == prod_dir.or(Some(product::NONE_PATH))
                && (table_file.is_none()
                    || existing.table_file.as_deref() == table_file);
            if !same {
                return Err(Error::database(
                    format!(
                        "{product} {version} is already declared for {flavor} with different paths \
                         (PROD_DIR = {})",
                        existing.prod_dir.as_deref().unwrap_or(product::NONE_PATH)
                    ),
                    "undeclare the existing version first, or declare with --force",
                ));
            }
        }

        parsed.add_flavor(flavor, prod_dir, ups_dir, table_file);
        parsed.write(&vfile)?;

        for tag in tags {
            self.write_tag(product, version, flavor, tag)?;
        }
        Ok(())
    }

    /// Remove a (product, version, flavor) declaration and any tags
    /// pointing at it. Removes empty files and the product directory when
    /// the last version goes.
    pub fn undeclare(&self, product: &str, version: &str, flavor: &str) -> Result<()> {
        let _lock = self.lock()?;

        let pdir = self.product_dir(product);
        let vfile = version_file_path(&pdir, version);
        if !vfile.exists() {
            return Err(Error::NoSuchVersion {
                product: product.to_string(),
                version: version.to_string(),
            });
        }

        let mut parsed = VersionFile::read(&vfile)?;
        if !parsed.remove_flavor(flavor) {
            return Err(Error::NoMatchingFlavor {
                product: product.to_string(),
                version: version.to_string(),
                flavor: flavor.to_string(),
            });
        }
        parsed.write(&vfile)?;

        // drop tags that pointed at the undeclared version
        for scope_dir in self.chain_dirs() {
            let cdir = scope_dir.join(product);
            let Ok(entries) = std::fs::read_dir(&cdir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let Some(tag) = name.strip_suffix(&format!(".{CHAIN_EXT}")) else {
                    continue;
                };
                let cpath = chain_file_path(&cdir, tag);
                let Ok(mut chain) = ChainFile::read(&cpath) else {
                    continue;
                };
                if chain.version_for(flavor) == Some(version) {
                    chain.remove_version(flavor);
                    chain.write(&cpath)?;
                }
            }
        }

        if self.versions_of(product).is_empty() {
            let _ = std::fs::remove_dir(&pdir);
        }
        Ok(())
    }

    /// Assign a tag to a declared version.
    pub fn assign_tag(&self, tag: &str, product: &str, version: &str, flavor: &str) -> Result<()> {
        // make sure the target exists before pointing at it
        self.find_version(product, version, flavor)?;
        let _lock = self.lock()?;
        self.write_tag(product, version, flavor, tag)
    }

    /// Remove a tag from a product for a flavor; true if it was assigned.
    pub fn unassign_tag(&self, tag: &str, product: &str, flavor: &str) -> Result<bool> {
        let _lock = self.lock()?;

        let bare = tag.strip_prefix("user:").unwrap_or(tag);
        let dir = self.scope_dir_for(tag)?.join(product);
        let cpath = chain_file_path(&dir, bare);
        let mut chain = ChainFile::read(&cpath)?;
        let removed = chain.remove_version(flavor);
        if removed {
            chain.write(&cpath)?;
        }
        Ok(removed)
    }

    fn write_tag(&self, product: &str, version: &str, flavor: &str, tag: &str) -> Result<()> {
        let bare = tag.strip_prefix("user:").unwrap_or(tag);
        let dir = self.scope_dir_for(tag)?.join(product);
        let cpath = chain_file_path(&dir, bare);
        let mut chain = ChainFile::read(&cpath)?;
        chain.product.get_or_insert_with(|| product.to_string());
        chain.tag.get_or_insert_with(|| bare.to_string());
        chain.set_version(version, flavor);
        chain.write(&cpath)
    }

    fn scope_dir_for(&self, tag: &str) -> Result<Utf8PathBuf> {
        if Self::is_user_tag(tag) {
            self.user_tag_root.clone().ok_or_else(|| {
                Error::database(
                    format!("No user tag directory available for tag \"{tag}\""),
                    "user tags need a writable home directory",
                )
            })
        } else {
            Ok(self.path.clone())
        }
    }

    /// Every declared (product, version, flavor) triple in this stack,
    /// optionally restricted to one product.
    pub fn list(&self, product_filter: Option<&str>) -> Result<Vec<Product>> {
        let mut out = Vec::new();

        for entry in WalkDir::new(&self.path)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(version) = name.strip_suffix(&format!(".{VERSION_EXT}")) else {
                continue;
            };
            let Some(product) = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            else {
                continue;
            };
            if product.starts_with('_') {
                continue;
            }
            if let Some(filter) = product_filter {
                if product != filter {
                    continue;
                }
            }

            let vfile = VersionFile::read(Utf8Path::from_path(entry.path()).ok_or_else(|| {
                Error::internal(format!("non-UTF8 path in database: {:?}", entry.path()))
            })?)?;
            for (flavor_name, _) in &vfile.info {
                if let Ok(p) = self.find_version(product, version, flavor_name) {
                    out.push(p);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().join("stack")).unwrap();
        std::fs::create_dir_all(root.join(UPS_DB)).unwrap();
        let user = Utf8PathBuf::from_path_buf(dir.path().join("user_db")).unwrap();
        std::fs::create_dir_all(&user).unwrap();
        let db = Database::new(&root, Some(user));
        (dir, db)
    }

    #[test]
    fn test_declare_find_round_trip() {
        let (_keep, db) = scratch_db();
        db.declare(
            "cfitsio",
            "3.450",
            "Linux64",
            Some("cfitsio/3.450"),
            None,
            Some("cfitsio.table"),
            &["current".to_string()],
        )
        .unwrap();

        let p = db.find_version("cfitsio", "3.450", "Linux64").unwrap();
        assert_eq!(p.version, "3.450");
        assert_eq!(
            p.dir.as_deref().unwrap(),
            db.stack_root.join("cfitsio/3.450")
        );
        assert_eq!(p.tags, vec!["current"]);

        assert_eq!(
            db.resolve_tag("cfitsio", "current", "Linux64").as_deref(),
            Some("3.450")
        );
    }

    #[test]
    fn test_flavor_selection_order() {
        let (_keep, db) = scratch_db();
        db.declare("tools", "1.0", "ANY", Some("tools/1.0"), None, None, &[])
            .unwrap();
        db.declare("tools", "1.0", "Linux64", Some("tools/1.0-linux"), None, None, &[])
            .unwrap();

        let p = db.find_version("tools", "1.0", "Linux64").unwrap();
        assert_eq!(p.flavor, "Linux64");
        let p = db.find_version("tools", "1.0", "DarwinX86").unwrap();
        assert_eq!(p.flavor, "ANY");
    }

    #[test]
    fn test_missing_lookups() {
        let (_keep, db) = scratch_db();
        assert!(matches!(
            db.find_version("nosuch", "1.0", "Linux64"),
            Err(Error::NoSuchProduct { .. })
        ));

        db.declare("tools", "1.0", "Linux", Some("tools/1.0"), None, None, &[])
            .unwrap();
        assert!(matches!(
            db.find_version("tools", "2.0", "Linux"),
            Err(Error::NoSuchVersion { .. })
        ));
        assert!(matches!(
            db.find_version("tools", "1.0", "DarwinX86"),
            Err(Error::NoMatchingFlavor { .. })
        ));
    }

    #[test]
    fn test_conflicting_redeclare_rejected() {
        let (_keep, db) = scratch_db();
        db.declare("tools", "1.0", "Linux64", Some("tools/1.0"), None, None, &[])
            .unwrap();
        // identical redeclare is fine
        db.declare("tools", "1.0", "Linux64", Some("tools/1.0"), None, None, &[])
            .unwrap();
        // different prod dir is not
        assert!(db
            .declare("tools", "1.0", "Linux64", Some("elsewhere/1.0"), None, None, &[])
            .is_err());
    }

    #[test]
    fn test_undeclare_drops_tags() {
        let (_keep, db) = scratch_db();
        db.declare(
            "tools",
            "1.0",
            "Linux64",
            Some("tools/1.0"),
            None,
            None,
            &["current".to_string()],
        )
        .unwrap();
        db.undeclare("tools", "1.0", "Linux64").unwrap();

        assert!(db.resolve_tag("tools", "current", "Linux64").is_none());
        assert!(db.versions_of("tools").is_empty());
    }

    #[test]
    fn test_user_tags_overlay() {
        let (_keep, db) = scratch_db();
        db.declare("tools", "1.0", "Linux64", Some("tools/1.0"), None, None, &[])
            .unwrap();
        db.declare("tools", "2.0", "Linux64", Some("tools/2.0"), None, None, &[])
            .unwrap();

        db.assign_tag("current", "tools", "1.0", "Linux64").unwrap();
        // "mine" is not a global tag, so it lands in the user overlay
        db.assign_tag("mine", "tools", "2.0", "Linux64").unwrap();

        assert_eq!(
            db.resolve_tag("tools", "current", "Linux64").as_deref(),
            Some("1.0")
        );
        assert_eq!(
            db.resolve_tag("tools", "mine", "Linux64").as_deref(),
            Some("2.0")
        );
        let tags = db.tags_for("tools", "2.0", "Linux64");
        assert_eq!(tags, vec!["user:mine"]);

        assert!(db.unassign_tag("mine", "tools", "Linux64").unwrap());
        assert!(db.resolve_tag("tools", "mine", "Linux64").is_none());
    }

    #[test]
    fn test_list_everything() {
        let (_keep, db) = scratch_db();
        db.declare("a", "1.0", "Linux64", Some("a/1.0"), None, None, &[])
            .unwrap();
        db.declare("b", "1.0", "ANY", Some("b/1.0"), None, None, &[])
            .unwrap();
        db.declare("b", "2.0", "ANY", Some("b/2.0"), None, None, &[])
            .unwrap();

        let all = db.list(None).unwrap();
        assert_eq!(all.len(), 3);
        let b_only = db.list(Some("b")).unwrap();
        assert_eq!(b_only.len(), 2);
    }
}
