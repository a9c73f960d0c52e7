//! Repository scanner for the contextfit CLI
//!
//! Walks the tree with the `ignore` crate (so .gitignore and friends are
//! honored), then reads files in parallel with rayon. Oversized and binary
//! files are skipped; everything else becomes a [`FileEntry`].

use anyhow::{Context, Result};
use glob::Pattern;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};

use contextfit_engine::FileEntry;

/// Files larger than this are never read
pub(crate) const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Bytes sniffed for NUL when deciding whether a file is binary
const BINARY_SNIFF_BYTES: usize = 8192;

/// Configuration for repository scanning
pub(crate) struct ScanConfig {
    /// Include hidden files (starting with .)
    pub include_hidden: bool,
    /// Respect .gitignore files
    pub respect_gitignore: bool,
    /// Maximum file size to include (bytes)
    pub max_file_size: u64,
    /// Only keep paths matching one of these (empty keeps everything)
    pub include: Vec<Pattern>,
    /// Drop paths matching any of these
    pub exclude: Vec<Pattern>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_hidden: false,
            respect_gitignore: true,
            max_file_size: MAX_FILE_SIZE,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl ScanConfig {
    /// Compile include/exclude globs
    pub fn with_patterns(mut self, include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| Pattern::new(p).with_context(|| format!("Invalid glob pattern: {}", p)))
                .collect()
        };
        self.include = compile(include)?;
        self.exclude = compile(exclude)?;
        Ok(self)
    }

    fn wants(&self, relative_path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(relative_path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(relative_path))
    }
}

/// Result of scanning one tree
pub(crate) struct Scan {
    /// Directory name of the scanned root
    pub name: String,
    pub root: PathBuf,
    /// Files sorted by path
    pub files: Vec<FileEntry>,
    /// Files skipped for size, binary content or encoding
    pub skipped: usize,
}

impl Scan {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// File info collected during initial walk
struct FileInfo {
    path: PathBuf,
    relative_path: String,
    size_bytes: u64,
}

/// Scan a directory into file entries
pub(crate) fn scan_repository(path: &Path, config: &ScanConfig) -> Result<Scan> {
    let root = path.canonicalize().context("Invalid repository path")?;
    let name = root.file_name().and_then(|n| n.to_str()).unwrap_or("repository").to_owned();

    let (file_infos, mut skipped) = collect_file_infos(&root, config);

    let results: Vec<Option<FileEntry>> =
        file_infos.into_par_iter().map(read_file).collect();
    let before = results.len();
    let mut files: Vec<FileEntry> = results.into_iter().flatten().collect();
    skipped += before - files.len();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    log::info!("scanned {}: {} files, {} skipped", root.display(), files.len(), skipped);
    Ok(Scan { name, root, files, skipped })
}

/// Collect file information (paths, sizes) without reading content
fn collect_file_infos(base_path: &Path, config: &ScanConfig) -> (Vec<FileInfo>, usize) {
    let mut file_infos = Vec::new();
    let mut skipped = 0;

    let walker = WalkBuilder::new(base_path)
        .hidden(!config.include_hidden)
        .git_ignore(config.respect_gitignore)
        .git_global(config.respect_gitignore)
        .git_exclude(config.respect_gitignore)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker.flatten() {
        let entry_path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let relative_path = entry_path
            .strip_prefix(base_path)
            .unwrap_or(entry_path)
            .to_string_lossy()
            .replace('\\', "/");
        if !config.wants(&relative_path) {
            continue;
        }

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size_bytes > config.max_file_size {
            log::debug!("skipping {} ({} bytes)", relative_path, size_bytes);
            skipped += 1;
            continue;
        }
        if is_binary_extension(entry_path) {
            skipped += 1;
            continue;
        }

        file_infos.push(FileInfo { path: entry_path.to_path_buf(), relative_path, size_bytes });
    }

    (file_infos, skipped)
}

/// Read one file; `None` for binary or non-UTF-8 content
fn read_file(info: FileInfo) -> Option<FileEntry> {
    let mut bytes = Vec::with_capacity(info.size_bytes as usize);
    let mut file = std::fs::File::open(&info.path).ok()?;
    file.read_to_end(&mut bytes).ok()?;

    if looks_binary(&bytes) {
        log::debug!("skipping binary file {}", info.relative_path);
        return None;
    }
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            log::debug!("skipping non-UTF-8 file {}", info.relative_path);
            return None;
        }
    };

    let mut entry = FileEntry::new(info.relative_path, content);
    if let Ok(modified) = file.metadata().and_then(|m| m.modified()) {
        entry = entry.with_modified(modified);
    }
    Some(entry)
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_BYTES)].contains(&0)
}

/// Check if file has a binary extension
fn is_binary_extension(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return false,
    };

    matches!(
        ext.as_str(),
        // Executables
        "exe" | "dll" | "so" | "dylib" | "a" | "o" | "obj" | "lib" |
        // Compiled
        "pyc" | "pyo" | "class" | "jar" | "wasm" |
        // Archives
        "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar" | "tgz" |
        // Images
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "ico" | "webp" | "tiff" | "psd" |
        // Audio/Video
        "mp3" | "mp4" | "avi" | "mov" | "wav" | "flac" | "ogg" | "webm" | "mkv" |
        // Documents
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" |
        // Fonts
        "woff" | "woff2" | "ttf" | "eot" | "otf" |
        // Database
        "db" | "sqlite" | "sqlite3"
    )
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use contextfit_engine::LanguageTag;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src")).unwrap();
        fs::create_dir_all(base.join("tests")).unwrap();
        fs::write(base.join("src/app.py"), "import os\n\ndef main():\n    pass\n").unwrap();
        fs::write(base.join("tests/test_app.py"), "def test_main():\n    assert True\n").unwrap();
        fs::write(base.join("README.md"), "# App\n").unwrap();
        fs::write(base.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(base.join("blob.dat"), [b'a', 0, b'b']).unwrap();
        fs::write(base.join(".env"), "SECRET=1\n").unwrap();
        dir
    }

    #[test]
    fn test_scan_skips_binary_and_hidden() {
        let dir = tree();
        let scan = scan_repository(dir.path(), &ScanConfig::default()).unwrap();
        let paths: Vec<_> = scan.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/app.py", "tests/test_app.py"]);
        assert_eq!(scan.skipped, 2);
        assert_eq!(scan.files[2].language, LanguageTag::Test);
        assert!(scan.files[1].modified.is_some());
    }

    #[test]
    fn test_hidden_and_patterns() {
        let dir = tree();
        let config = ScanConfig { include_hidden: true, ..Default::default() }
            .with_patterns(&["**/*.py".to_string(), ".env".to_string()], &["tests/**".to_string()])
            .unwrap();
        let scan = scan_repository(dir.path(), &config).unwrap();
        let paths: Vec<_> = scan.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".env", "src/app.py"]);
    }

    #[test]
    fn test_gitignore_respected() {
        let dir = tree();
        fs::write(dir.path().join(".gitignore"), "src/\n").unwrap();
        let scan = scan_repository(dir.path(), &ScanConfig::default()).unwrap();
        assert!(scan.files.iter().all(|f| !f.path.starts_with("src/")));

        let config = ScanConfig { respect_gitignore: false, ..Default::default() };
        let scan = scan_repository(dir.path(), &config).unwrap();
        assert!(scan.files.iter().any(|f| f.path == "src/app.py"));
    }

    #[test]
    fn test_size_limit() {
        let dir = tree();
        let config = ScanConfig { max_file_size: 10, ..Default::default() };
        let scan = scan_repository(dir.path(), &config).unwrap();
        assert_eq!(scan.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(), vec!["README.md"]);
    }

    #[test]
    fn test_is_binary_extension() {
        assert!(is_binary_extension(&PathBuf::from("test.exe")));
        assert!(is_binary_extension(&PathBuf::from("test.png")));
        assert!(!is_binary_extension(&PathBuf::from("test.rs")));
        assert!(!is_binary_extension(&PathBuf::from("test.py")));
    }

    #[test]
    fn test_looks_binary() {
        assert!(looks_binary(b"\x00abc"));
        assert!(!looks_binary(b"plain text"));
    }
}
