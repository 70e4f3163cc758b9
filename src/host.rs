//! Seams to the host document-editing environment.
//!
//! The surrounding application owns file storage and the edit surface; this
//! crate only talks to them through [`Vault`] and [`Editor`]. In-memory
//! implementations back the test suite and double as a reference for
//! embedders.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// The host's file storage (a vault of notes plus binary attachments).
///
/// Paths are vault-relative, `/`-separated. Note paths include the `.md`
/// extension. All operations are suspension points in the host environment,
/// hence the async contract.
#[async_trait::async_trait]
pub trait Vault: Send + Sync {
    /// Resolve a short or relative link (e.g. `scan.png`) to a full
    /// vault-relative path. `None` means no such file exists.
    async fn resolve_link(&self, link: &str) -> Option<String>;

    /// Read a file's binary content.
    async fn read_binary(&self, path: &str) -> anyhow::Result<Vec<u8>>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> bool;

    /// Whether a folder exists at `path`.
    async fn folder_exists(&self, path: &str) -> bool;

    /// Create a folder (and any missing parents).
    async fn create_folder(&self, path: &str) -> anyhow::Result<()>;

    /// Read a text file.
    async fn read(&self, path: &str) -> anyhow::Result<String>;

    /// Create a new text file. Fails if the file already exists.
    async fn create(&self, path: &str, content: &str) -> anyhow::Result<()>;

    /// Replace an existing text file's content.
    async fn overwrite(&self, path: &str, content: &str) -> anyhow::Result<()>;

    /// Open the file in a view and move the cursor to end-of-document.
    async fn open_at_end(&self, path: &str) -> anyhow::Result<()>;
}

/// The host's active edit surface, if any.
pub trait Editor: Send {
    /// The current selection (possibly empty); `None` when no edit surface
    /// is available at all.
    fn selection(&self) -> Option<String>;

    /// Replace the current selection with `text` and advance the cursor to
    /// just past the inserted text.
    fn replace_selection(&mut self, text: &str) -> anyhow::Result<()>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// In-memory vault used by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    inner: Arc<RwLock<VaultState>>,
}

#[derive(Debug, Default)]
struct VaultState {
    notes: HashMap<String, String>,
    binaries: HashMap<String, Vec<u8>>,
    folders: HashSet<String>,
    opened: Option<String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a note for a test scenario.
    pub fn with_note(self, path: &str, content: &str) -> Self {
        self.inner
            .write()
            .unwrap()
            .notes
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Seed a binary attachment for a test scenario.
    pub fn with_binary(self, path: &str, data: Vec<u8>) -> Self {
        self.inner
            .write()
            .unwrap()
            .binaries
            .insert(path.to_string(), data);
        self
    }

    /// Content of a note, for assertions.
    pub fn note(&self, path: &str) -> Option<String> {
        self.inner.read().unwrap().notes.get(path).cloned()
    }

    /// The last path passed to `open_at_end`.
    pub fn last_opened(&self) -> Option<String> {
        self.inner.read().unwrap().opened.clone()
    }

    /// All note paths, sorted, for assertions.
    pub fn note_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.read().unwrap().notes.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait::async_trait]
impl Vault for MemoryVault {
    async fn resolve_link(&self, link: &str) -> Option<String> {
        let state = self.inner.read().unwrap();
        if state.binaries.contains_key(link) || state.notes.contains_key(link) {
            return Some(link.to_string());
        }
        // Short links match any file whose final segment equals the link.
        state
            .binaries
            .keys()
            .chain(state.notes.keys())
            .find(|p| p.rsplit('/').next() == Some(link))
            .cloned()
    }

    async fn read_binary(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.inner
            .read()
            .unwrap()
            .binaries
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no binary at {path}"))
    }

    async fn exists(&self, path: &str) -> bool {
        let state = self.inner.read().unwrap();
        state.notes.contains_key(path) || state.binaries.contains_key(path)
    }

    async fn folder_exists(&self, path: &str) -> bool {
        self.inner.read().unwrap().folders.contains(path)
    }

    async fn create_folder(&self, path: &str) -> anyhow::Result<()> {
        self.inner.write().unwrap().folders.insert(path.to_string());
        Ok(())
    }

    async fn read(&self, path: &str) -> anyhow::Result<String> {
        self.inner
            .read()
            .unwrap()
            .notes
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no note at {path}"))
    }

    async fn create(&self, path: &str, content: &str) -> anyhow::Result<()> {
        let mut state = self.inner.write().unwrap();
        if state.notes.contains_key(path) {
            anyhow::bail!("file already exists: {path}");
        }
        state.notes.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn overwrite(&self, path: &str, content: &str) -> anyhow::Result<()> {
        self.inner
            .write()
            .unwrap()
            .notes
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn open_at_end(&self, path: &str) -> anyhow::Result<()> {
        self.inner.write().unwrap().opened = Some(path.to_string());
        Ok(())
    }
}

/// In-memory editor used by tests. Holds a buffer with a cursor/selection
/// span; `replace_selection` splices and advances the cursor.
#[derive(Debug, Default)]
pub struct MemoryEditor {
    buffer: String,
    sel_start: usize,
    sel_end: usize,
    active: bool,
}

impl MemoryEditor {
    /// An editor with an empty buffer and the cursor at position 0.
    pub fn new() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    /// An editor whose buffer is `text` with `[sel_start, sel_end)` selected.
    pub fn with_selection(text: &str, sel_start: usize, sel_end: usize) -> Self {
        Self {
            buffer: text.to_string(),
            sel_start,
            sel_end,
            active: true,
        }
    }

    /// Simulates the host having no open editor.
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.sel_end
    }
}

impl Editor for MemoryEditor {
    fn selection(&self) -> Option<String> {
        if !self.active {
            return None;
        }
        Some(self.buffer[self.sel_start..self.sel_end].to_string())
    }

    fn replace_selection(&mut self, text: &str) -> anyhow::Result<()> {
        if !self.active {
            anyhow::bail!("no active editor");
        }
        self.buffer
            .replace_range(self.sel_start..self.sel_end, text);
        self.sel_start += text.len();
        self.sel_end = self.sel_start;
        Ok(())
    }
}
