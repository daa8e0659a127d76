//! Namespaced, file-backed asset identifiers

use super::{roots, AssetError};
use crate::foundation::fail::{FailureKind, OrFail};
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Identifier of an asset file: `(namespace, relative path)`
///
/// The string form is `<namespace>:<path>`. A string without `:` has an empty
/// namespace. Ids always point at an existing file; constructing one for a
/// missing file is fatal.
#[derive(Clone, PartialEq, Eq)]
pub struct AssetId {
    namespace: String,
    path: String,
}

impl AssetId {
    /// Create an id from its parts, failing if the file does not exist
    #[track_caller]
    pub fn new(namespace: &str, path: &str) -> Self {
        Self::try_new(namespace, path).or_fail(FailureKind::AssetMissing, "AssetId::new")
    }

    /// Parse `<namespace>:<path>` or a bare `<path>`, failing if the file does not exist
    #[track_caller]
    pub fn parse(fully_qualified: &str) -> Self {
        Self::try_parse(fully_qualified).or_fail(FailureKind::AssetMissing, "AssetId::parse")
    }

    /// Fallible form of [`AssetId::new`]
    pub fn try_new(namespace: &str, path: &str) -> Result<Self, AssetError> {
        if namespace.contains(':') || path.is_empty() {
            return Err(AssetError::InvalidId(format!("{namespace}:{path}")));
        }

        let id = Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        };

        if id.exists() {
            Ok(id)
        } else {
            Err(AssetError::NotFound {
                id: id.fully_qualified(),
                searched: vec![
                    id.candidate(&roots::game_assets_dir()),
                    id.candidate(&roots::engine_assets_dir()),
                ],
            })
        }
    }

    /// Fallible form of [`AssetId::parse`]
    pub fn try_parse(fully_qualified: &str) -> Result<Self, AssetError> {
        match fully_qualified.split_once(':') {
            Some((namespace, path)) => Self::try_new(namespace, path),
            None => Self::try_new("", fully_qualified),
        }
    }

    /// Namespace part; empty for engine-relative ids
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Path relative to the namespace directory
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `<namespace>:<path>`
    pub fn fully_qualified(&self) -> String {
        format!("{}:{}", self.namespace, self.path)
    }

    /// Resolved file location: the game root if the file is there, else the engine root
    pub fn file_path(&self) -> PathBuf {
        self.resolve(&roots::game_assets_dir(), &roots::engine_assets_dir())
    }

    /// Location of the file under explicit roots; `game_root` shadows `engine_root`
    pub fn resolve(&self, game_root: &Path, engine_root: &Path) -> PathBuf {
        let game = self.candidate(game_root);
        if game.exists() {
            game
        } else {
            self.candidate(engine_root)
        }
    }

    /// Whether the id currently resolves to a file
    pub fn exists(&self) -> bool {
        self.file_path().is_file()
    }

    /// Extension of the path, if any
    pub fn extension(&self) -> Option<&str> {
        std::path::Path::new(&self.path).extension().and_then(|ext| ext.to_str())
    }

    /// Read the file as UTF-8 text
    pub fn read_to_string(&self) -> Result<String, AssetError> {
        std::fs::read_to_string(self.file_path()).map_err(|source| AssetError::Io {
            id: self.fully_qualified(),
            source,
        })
    }

    /// Read the file as raw bytes
    pub fn read_bytes(&self) -> Result<Vec<u8>, AssetError> {
        std::fs::read(self.file_path()).map_err(|source| AssetError::Io {
            id: self.fully_qualified(),
            source,
        })
    }

    fn candidate(&self, root: &Path) -> PathBuf {
        root.join(&self.namespace).join(&self.path)
    }
}

impl Ord for AssetId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fully_qualified().cmp(&other.fully_qualified())
    }
}

impl PartialOrd for AssetId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for AssetId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fully_qualified().hash(state);
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({self})")
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fully_qualified = String::deserialize(deserializer)?;
        Self::try_parse(&fully_qualified).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const VERT: &str = "engine:shaders/triangle.vert";
    const FRAG: &str = "engine:shaders/triangle.frag";

    #[test]
    fn test_fully_qualified_round_trip() {
        let parsed = AssetId::parse(VERT);
        assert_eq!(parsed.fully_qualified(), VERT);
        assert_eq!(parsed.namespace(), "engine");
        assert_eq!(parsed.path(), "shaders/triangle.vert");
        assert_eq!(AssetId::new("engine", "shaders/triangle.vert"), parsed);
    }

    #[test]
    fn test_bare_path_has_empty_namespace() {
        let id = AssetId::parse("engine.toml");
        assert_eq!(id.namespace(), "");
        assert_eq!(id.fully_qualified(), ":engine.toml");
        assert_eq!(id, AssetId::parse(":engine.toml"));
    }

    #[test]
    fn test_ordering_matches_fully_qualified_strings() {
        let ids = [AssetId::parse(VERT), AssetId::parse(FRAG), AssetId::parse(":engine.toml")];
        for a in &ids {
            for b in &ids {
                assert_eq!(a.cmp(b), a.fully_qualified().cmp(&b.fully_qualified()));
                let relations = [a < b, a == b, a > b];
                assert_eq!(relations.iter().filter(|held| **held).count(), 1);
            }
        }
    }

    #[test]
    fn test_hash_follows_equality() {
        let set: HashSet<AssetId> = [AssetId::parse(VERT), AssetId::new("engine", "shaders/triangle.vert")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_resolves_into_engine_root() {
        let id = AssetId::parse(VERT);
        assert!(id.file_path().ends_with("engine/shaders/triangle.vert"));
        assert_eq!(id.extension(), Some("vert"));
        assert!(id.read_to_string().unwrap().contains("void main"));
    }

    fn unchecked(namespace: &str, path: &str) -> AssetId {
        AssetId {
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let file = root.join(relative);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, contents).unwrap();
    }

    #[test]
    fn test_game_root_shadows_engine_root() {
        let game = tempfile::tempdir().unwrap();
        let engine = tempfile::tempdir().unwrap();
        write(game.path(), "demo/both.txt", "game");
        write(engine.path(), "demo/both.txt", "engine");

        let resolved = unchecked("demo", "both.txt").resolve(game.path(), engine.path());
        assert_eq!(resolved, game.path().join("demo/both.txt"));
        assert_eq!(std::fs::read_to_string(resolved).unwrap(), "game");
    }

    #[test]
    fn test_game_only_and_engine_only_files_resolve() {
        let game = tempfile::tempdir().unwrap();
        let engine = tempfile::tempdir().unwrap();
        write(game.path(), "demo/game_only.txt", "game");
        write(engine.path(), "demo/engine_only.txt", "engine");

        assert_eq!(
            unchecked("demo", "game_only.txt").resolve(game.path(), engine.path()),
            game.path().join("demo/game_only.txt")
        );
        assert_eq!(
            unchecked("demo", "engine_only.txt").resolve(game.path(), engine.path()),
            engine.path().join("demo/engine_only.txt")
        );
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = AssetId::try_parse("engine:does/not/exist.txt").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
        assert!(matches!(AssetId::try_new("a:b", "c"), Err(AssetError::InvalidId(_))));
    }

    #[test]
    #[should_panic(expected = "asset missing")]
    fn test_missing_file_is_fatal() {
        let _ = AssetId::parse("engine:does/not/exist.txt");
    }

    #[test]
    fn test_deserialize_from_string() {
        #[derive(Deserialize)]
        struct Doc {
            shader: AssetId,
        }

        let doc: Doc = toml::from_str(&format!("shader = \"{FRAG}\"")).unwrap();
        assert_eq!(doc.shader.fully_qualified(), FRAG);
        assert!(toml::from_str::<Doc>("shader = \"engine:nope.frag\"").is_err());
    }
}
