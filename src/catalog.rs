//! Catalog wire types and the server-side directory scanner.
//!
//! The flat [`CatalogEntry`] list is the authoritative transfer order; the
//! [`FileTreeNode`] tree exists for display only. Both are rebuilt from the
//! filesystem on every catalog request.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Read size used while hashing. Not a protocol constant; any chunk size
/// produces the same digest.
const HASH_CHUNK_SIZE: usize = 8192;

/// One file under a game root, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// POSIX-style path relative to the game root, forward slashes only.
    pub path: String,
    /// Size in bytes at scan time.
    pub size: u64,
    /// Algorithm-tagged hex digest, e.g. `sha256:ab12...`.
    pub checksum: String,
    /// Same as `path`; kept on the wire for compatibility.
    pub relative_path: String,
    /// Server-relative URL for the range delivery endpoint.
    pub download_url: String,
}

/// Display-only tree node. Directories sort before files, then
/// case-insensitive by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileTreeNode {
    /// A regular file.
    File {
        /// Base name of the file.
        name: String,
        /// Path relative to the game root.
        path: String,
        /// Size in bytes.
        size: u64,
        /// Algorithm-tagged hex digest.
        checksum: String,
    },
    /// A directory with its children.
    Directory {
        /// Base name of the directory.
        name: String,
        /// Path relative to the game root, with a trailing slash.
        path: String,
        /// Child nodes, directories first.
        children: Vec<FileTreeNode>,
    },
}

/// Body of `GET /games/{id}`: the full catalog of one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameCatalog {
    /// Game id the catalog was built for.
    pub game_id: String,
    /// Display name.
    pub game_name: String,
    /// Ordered file list, the source of truth for transfers.
    pub files: Vec<CatalogEntry>,
    /// Number of files in `files`.
    pub total_files: usize,
    /// Sum of all file sizes; must match what the client will receive.
    pub total_size: u64,
    /// Display tree mirroring `files`.
    pub file_tree: Vec<FileTreeNode>,
    /// Opaque configuration passed through verbatim to the client.
    #[serde(default, rename = "clientConfig", skip_serializing_if = "Option::is_none")]
    pub client_config: Option<serde_json::Value>,
}

/// One game as listed by `GET /games`, without file data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSummary {
    /// Stable game id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque configuration passed through verbatim to the client.
    #[serde(default, rename = "clientConfig", skip_serializing_if = "Option::is_none")]
    pub client_config: Option<serde_json::Value>,
}

/// Body of `GET /games`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameList {
    /// All configured games.
    pub games: Vec<GameSummary>,
}

/// Body of `GET /games/{id}/start`: a resolved percent-resume point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInfo {
    /// Game id the resolution was made for.
    pub game_id: String,
    /// Index of the file to resume at; equals `files.len()` when done.
    pub start_file_index: usize,
    /// Path of that file, or empty when nothing is left.
    pub start_file_path: String,
    /// Byte offset within the starting file.
    pub start_file_offset: u64,
    /// The catalog file list the indices refer to.
    pub files: Vec<CatalogEntry>,
    /// Human-readable summary; not machine-parseable.
    pub message: String,
    /// Opaque configuration passed through verbatim to the client.
    #[serde(default, rename = "clientConfig", skip_serializing_if = "Option::is_none")]
    pub client_config: Option<serde_json::Value>,
}

/// True when a catalog-relative path stays inside its root: non-empty,
/// relative, and made of plain name segments only (no `..`, no prefix,
/// no root). Checked at scan time by construction and again at serve time.
#[must_use]
pub fn is_clean_relative_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Streams a file through SHA-256 and returns the tagged digest.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Walks a game root and produces the ordered entry list plus the display
/// tree. Blocking; callers inside an async context should wrap this in
/// `spawn_blocking`.
///
/// # Errors
///
/// Any I/O failure on any entry (unreadable directory, permission error,
/// broken symlink) fails the whole scan with [`Error::Scan`].
pub fn scan_game_dir(game_id: &str, root: &Path) -> Result<(Vec<CatalogEntry>, Vec<FileTreeNode>)> {
    let mut files = Vec::new();
    let tree = scan_level(game_id, root, "", &mut files)?;
    Ok((files, tree))
}

fn scan_err(path: &Path, source: std::io::Error) -> Error {
    Error::Scan {
        path: path.display().to_string(),
        source,
    }
}

fn scan_level(
    game_id: &str,
    dir: &Path,
    prefix: &str,
    files: &mut Vec<CatalogEntry>,
) -> Result<Vec<FileTreeNode>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| scan_err(dir, e))? {
        let entry = entry.map_err(|e| scan_err(dir, e))?;
        let is_dir = entry
            .metadata()
            .map_err(|e| scan_err(&entry.path(), e))?
            .is_dir();
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((entry.path(), name, is_dir));
    }
    // Directories first, then case-insensitive name order.
    entries.sort_by_cached_key(|(_, name, is_dir)| (!*is_dir, name.to_lowercase()));

    let mut tree = Vec::new();
    for (path, name, is_dir) in entries {
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if is_dir {
            let children = scan_level(game_id, &path, &rel, files)?;
            tree.push(FileTreeNode::Directory {
                name,
                path: format!("{rel}/"),
                children,
            });
        } else {
            let size = std::fs::metadata(&path).map_err(|e| scan_err(&path, e))?.len();
            let checksum = hash_file(&path).map_err(|e| scan_err(&path, e))?;
            files.push(CatalogEntry {
                path: rel.clone(),
                size,
                checksum: checksum.clone(),
                relative_path: rel.clone(),
                download_url: format!("/download/file/{game_id}/{rel}"),
            });
            tree.push(FileTreeNode::File {
                name,
                path: rel,
                size,
                checksum,
            });
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HELLO_SHA256: &str =
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn make_game_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/level1.bin"), vec![7u8; 300]).unwrap();
        fs::write(dir.path().join("data/Level2.bin"), vec![9u8; 100]).unwrap();
        fs::create_dir(dir.path().join("Assets")).unwrap();
        fs::write(dir.path().join("Assets/tex.dat"), b"x").unwrap();
        dir
    }

    #[test]
    fn scan_orders_dirs_before_files_case_insensitive() {
        let dir = make_game_dir();
        let (files, tree) = scan_game_dir("demo", dir.path()).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "Assets/tex.dat",
                "data/level1.bin",
                "data/Level2.bin",
                "readme.txt"
            ]
        );

        // Top level: two directories first (Assets before data), then the file.
        assert_eq!(tree.len(), 3);
        assert!(matches!(&tree[0], FileTreeNode::Directory { name, .. } if name == "Assets"));
        assert!(matches!(&tree[1], FileTreeNode::Directory { name, .. } if name == "data"));
        assert!(matches!(&tree[2], FileTreeNode::File { name, .. } if name == "readme.txt"));
    }

    #[test]
    fn scan_computes_sizes_and_checksums() {
        let dir = make_game_dir();
        let (files, _) = scan_game_dir("demo", dir.path()).unwrap();

        let readme = files.iter().find(|f| f.path == "readme.txt").unwrap();
        assert_eq!(readme.size, 5);
        assert_eq!(readme.checksum, HELLO_SHA256);
        assert_eq!(readme.download_url, "/download/file/demo/readme.txt");

        let total: u64 = files.iter().map(|f| f.size).sum();
        assert_eq!(total, 5 + 300 + 100 + 1);
    }

    #[test]
    fn scan_directory_nodes_have_trailing_slash() {
        let dir = make_game_dir();
        let (_, tree) = scan_game_dir("demo", dir.path()).unwrap();
        let FileTreeNode::Directory { path, children, .. } = &tree[1] else {
            panic!("expected directory node");
        };
        assert_eq!(path, "data/");
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn scan_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = scan_game_dir("demo", &missing).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }

    #[test]
    fn hash_file_matches_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();
        assert_eq!(hash_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn hash_file_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn clean_relative_path_rules() {
        assert!(is_clean_relative_path("a.bin"));
        assert!(is_clean_relative_path("data/level1.bin"));
        assert!(!is_clean_relative_path(""));
        assert!(!is_clean_relative_path("../secret"));
        assert!(!is_clean_relative_path("data/../../secret"));
        assert!(!is_clean_relative_path("/etc/passwd"));
        assert!(!is_clean_relative_path("./a.bin"));
    }

    #[test]
    fn catalog_entry_wire_shape() {
        let entry = CatalogEntry {
            path: "a.bin".to_string(),
            size: 10,
            checksum: "sha256:00".to_string(),
            relative_path: "a.bin".to_string(),
            download_url: "/download/file/g/a.bin".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["path"], "a.bin");
        assert_eq!(json["size"], 10);
        assert_eq!(json["relative_path"], "a.bin");
    }

    #[test]
    fn tree_node_serializes_with_type_tag() {
        let node = FileTreeNode::Directory {
            name: "data".to_string(),
            path: "data/".to_string(),
            children: vec![FileTreeNode::File {
                name: "a".to_string(),
                path: "data/a".to_string(),
                size: 1,
                checksum: "sha256:00".to_string(),
            }],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "directory");
        assert_eq!(json["children"][0]["type"], "file");
    }

    #[test]
    fn client_config_is_omitted_when_absent() {
        let list = GameList {
            games: vec![GameSummary {
                id: "g".to_string(),
                name: "G".to_string(),
                version: "1.0".to_string(),
                description: None,
                client_config: None,
            }],
        };
        let json = serde_json::to_string(&list).unwrap();
        assert!(!json.contains("clientConfig"));
        assert!(!json.contains("description"));
    }
}
