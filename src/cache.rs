//! Output cache for incremental renders.
//!
//! A large config can ask for hundreds of sheets, each one decoding a dozen
//! PNG strips. When nothing a sheet depends on has changed since the last
//! run, the render skips composition and keeps the PNG it already wrote.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups go by the pair
//! (`source_hash`, `params_hash`), not by output file name. Renaming an
//! output in the config reuses the old file instead of re-rendering.
//!
//! - **`source_hash`**: SHA-256 over every input file, in order. For a sheet
//!   that is the definition JSON followed by every asset path the resolver
//!   plans for the selection; for a character, every candidate strip. An
//!   absent file contributes a marker, so adding a missing frame later
//!   invalidates the entry.
//!
//! - **`params_hash`**: SHA-256 of the selection and the canvas settings:
//!   variant, body type, template parameters, canvas strategy and path
//!   layout ([`hash_sheet_params`]); or of the full character spec
//!   ([`hash_character_params`]).
//!
//! A cache hit requires:
//! 1. An entry with matching `source_hash` and `params_hash` exists
//! 2. The previously-written output file still exists on disk
//!
//! When a hit is found under another output name, the cached file is copied
//! to the new name instead of re-rendering.
//!
//! ## Storage
//!
//! The manifest is a JSON file at `<output_dir>/.layersheet-cache.json`, next
//! to the sheets it describes.
//!
//! ## Bypassing the cache
//!
//! `render --no-cache` starts from an empty manifest, so every sheet is
//! composed again and old files are overwritten.

use crate::character::CharacterSpec;
use crate::compose::{CompositionOptions, Selection};
use crate::imaging::CanvasStrategy;
use crate::resolve::PathLayout;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache manifest file within the output directory.
const MANIFEST_FILENAME: &str = ".layersheet-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// A single cached output file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk manifest mapping output file names to their cache entries.
///
/// Lookups go through a runtime `content_index` that maps
/// `"{source_hash}:{params_hash}"` to the stored output name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// Built at load time, maintained on insert. Never serialized.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    /// Create an empty manifest (used for `--no-cache` or a first run).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let path = manifest_path(output_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(_) => return Self::empty(),
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(output_dir), json)
    }

    /// Look up a previously written output by content hashes.
    ///
    /// Returns the stored output name if a matching entry exists **and** the
    /// file is still on disk. It may differ from the name the caller wants;
    /// copying is up to the caller.
    pub fn find_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        output_dir: &Path,
    ) -> Option<String> {
        let content_key = format!("{}:{}", source_hash, params_hash);
        let stored = self.content_index.get(&content_key)?;
        if output_dir.join(stored).exists() {
            Some(stored.clone())
        } else {
            None
        }
    }

    /// Record a cache entry for an output file.
    ///
    /// An entry with the same content under another name is dropped, so the
    /// manifest follows renamed outputs.
    pub fn insert(&mut self, output_name: String, source_hash: String, params_hash: String) {
        let content_key = format!("{}:{}", source_hash, params_hash);

        if let Some(old_name) = self.content_index.get(&content_key)
            && *old_name != output_name
        {
            self.entries.remove(old_name.as_str());
        }

        self.content_index.insert(content_key, output_name.clone());
        self.entries.insert(
            output_name,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(output_name, entry)| {
            let content_key = format!("{}:{}", entry.source_hash, entry.params_hash);
            (content_key, output_name.clone())
        })
        .collect()
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 over the contents of `files`, in order.
///
/// Each file contributes its path and its bytes; unreadable files contribute
/// their path and a marker instead.
pub fn hash_sources(files: &[PathBuf]) -> String {
    let mut hasher = Sha256::new();
    for path in files {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        match std::fs::read(path) {
            Ok(bytes) => {
                hasher.update(b"\x01");
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(&bytes);
            }
            Err(_) => hasher.update(b"\x00"),
        }
    }
    format!("{:x}", hasher.finalize())
}

fn update_options(hasher: &mut Sha256, options: &CompositionOptions) {
    match options.canvas {
        CanvasStrategy::Fixed { width, height } => {
            hasher.update(b"fixed\0");
            hasher.update(width.to_le_bytes());
            hasher.update(height.to_le_bytes());
        }
        CanvasStrategy::Adaptive => hasher.update(b"adaptive\0"),
    }
    match options.layout {
        PathLayout::Single => hasher.update(b"single\0"),
        PathLayout::PerAnimation => hasher.update(b"per_animation\0"),
    }
}

/// SHA-256 of everything besides file contents that shapes one sheet.
pub fn hash_sheet_params(selection: &Selection<'_>, options: &CompositionOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"sheet\0");
    hasher.update(selection.variant.as_bytes());
    hasher.update(b"\0");
    hasher.update(selection.sex.as_str().as_bytes());
    hasher.update(b"\0");
    match selection.params {
        Some(params) => {
            hasher.update(b"\x01");
            for (key, value) in params {
                hasher.update(key.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
                hasher.update(b"\0");
            }
        }
        None => hasher.update(b"\x00"),
    }
    update_options(&mut hasher, options);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a character spec (name excluded, so renames hit the cache).
pub fn hash_character_params(spec: &CharacterSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"character\0");
    hasher.update(spec.sex.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(spec.body_variant.as_bytes());
    hasher.update(b"\0");
    for (component, details) in &spec.components {
        hasher.update(component.as_bytes());
        hasher.update(b"\0");
        for part in [&details.style, &details.variant] {
            match part {
                Some(value) => {
                    hasher.update(b"\x01");
                    hasher.update(value.as_bytes());
                    hasher.update(b"\0");
                }
                None => hasher.update(b"\x00"),
            }
        }
    }
    hasher.update(b"animations\0");
    for animation in spec.animations() {
        hasher.update(animation.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a render run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub copies: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn copy(&mut self) {
        self.copies += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits == 0 && self.copies == 0 {
            return write!(f, "{} rendered", self.misses);
        }
        if self.copies > 0 {
            write!(
                f,
                "{} cached, {} copied, {} rendered ({} total)",
                self.hits,
                self.copies,
                self.misses,
                self.total()
            )
        } else {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        }
    }
}

/// Resolve the cache manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}
