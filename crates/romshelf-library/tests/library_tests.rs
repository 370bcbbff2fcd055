//! Integration tests for the library index over a real directory tree

use romshelf_config::{Preferences, REFRESH_REQUIRED_KEY, SEARCH_LOCATION_KEY, TomlPreferences};
use romshelf_library::mock::NroImage;
use romshelf_library::{
    DirectoryScanner, IndexState, Library, LibraryCache, LibraryError, LoaderRegistry,
    LocalStorage, NroLoader, SkipReason, TitleFormat,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test helper to create a temporary test environment
struct TestEnvironment {
    #[allow(dead_code)]
    temp_dir: TempDir,
    games_dir: PathBuf,
    data_dir: PathBuf,
}

impl TestEnvironment {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let games_dir = temp_dir.path().join("games");
        let data_dir = temp_dir.path().join("data");

        fs::create_dir_all(&games_dir).expect("Failed to create games directory");

        Self {
            temp_dir,
            games_dir,
            data_dir,
        }
    }

    fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.games_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, data).expect("Failed to write test file");
        path
    }

    fn root(&self) -> String {
        self.games_dir.to_string_lossy().to_string()
    }

    fn cache_path(&self) -> PathBuf {
        self.data_dir.join("roms.bin")
    }

    fn preferences(&self) -> TomlPreferences {
        TomlPreferences::open(self.data_dir.join("preferences.toml"))
            .expect("Failed to open preferences")
    }

    fn library(&self) -> Library<LocalStorage, TomlPreferences> {
        Library::new(
            LocalStorage::new(),
            self.preferences(),
            LoaderRegistry::with_defaults(),
            LibraryCache::new(self.cache_path()),
            DirectoryScanner::new(),
        )
    }

    fn configure_root(&self) {
        let mut prefs = self.preferences();
        prefs
            .set_string(SEARCH_LOCATION_KEY, &self.root())
            .expect("Failed to set search location");
    }
}

fn file_name(location: &str) -> String {
    Path::new(location)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[test]
fn test_games_scenario() {
    let env = TestEnvironment::new();
    env.write("a.nro", &NroImage::new("Alpha").build());
    env.write("b.nro", &[0u8; 0x90]);
    env.write("readme.txt", b"not a rom");

    let result = DirectoryScanner::new()
        .scan(&LocalStorage::new(), &env.root(), "nro", &NroLoader::new())
        .unwrap();

    assert_eq!(result.entries.len(), 1);
    assert_eq!(file_name(result.entries[0].location()), "a.nro");
    assert_eq!(result.entries[0].name(), "Alpha");
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].reason, SkipReason::Unverified);
}

#[test]
fn test_nested_tree_and_mixed_case() {
    let env = TestEnvironment::new();
    env.write("homebrew/tools/ftpd.NRO", &NroImage::new("ftpd").build());
    env.write("homebrew/emu/retro.nro", &NroImage::new("RetroArch").build());
    env.write("noextension", &NroImage::new("Nope").build());
    env.write("homebrew/notes.md", b"# notes");

    let result = DirectoryScanner::new()
        .scan(&LocalStorage::new(), &env.root(), "nro", &NroLoader::new())
        .unwrap();

    let mut names: Vec<_> = result.entries.iter().map(|e| e.name()).collect();
    names.sort();
    assert_eq!(names, vec!["RetroArch", "ftpd"]);
    assert!(
        result
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::MalformedName)
    );
}

#[test]
fn test_valid_and_corrupt_same_extension() {
    let env = TestEnvironment::new();
    env.write("good.nro", &NroImage::new("Good").build());
    let mut corrupt = NroImage::new("Corrupt").build();
    corrupt.truncate(NroImage::DEFAULT_IMAGE_SIZE + 0x10);
    env.write("corrupt.nro", &corrupt);

    let result = DirectoryScanner::new()
        .scan(&LocalStorage::new(), &env.root(), "nro", &NroLoader::new())
        .unwrap();

    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].name(), "Good");
    assert_eq!(result.skipped.len(), 1);
    assert!(matches!(result.skipped[0].reason, SkipReason::Corrupt(_)));
}

#[test]
fn test_missing_root_is_reported() {
    let env = TestEnvironment::new();
    let missing = env.games_dir.join("does-not-exist");

    let err = DirectoryScanner::new()
        .scan(
            &LocalStorage::new(),
            &missing.to_string_lossy(),
            "nro",
            &NroLoader::new(),
        )
        .unwrap_err();
    assert!(matches!(err, LibraryError::RootUnavailable { .. }));
}

#[test]
fn test_absent_cache_rescans_then_loads_identically() {
    let env = TestEnvironment::new();
    env.write("a.nro", &NroImage::new("Alpha").with_author("dev").build());
    env.write("sub/b.nro", &NroImage::new("Beta").with_icon(vec![9; 32]).build());
    env.configure_root();

    let mut library = env.library();
    let scanned = library.get_entries().unwrap().clone();
    assert_eq!(scanned.len(), 2);
    assert_eq!(library.source(), IndexState::Rescanning);
    assert!(env.cache_path().exists());

    let loaded = LibraryCache::new(env.cache_path()).load().unwrap();
    assert_eq!(loaded, scanned);
    assert_eq!(loaded.groups()[0].format, TitleFormat::Nro);

    // A new session trusts the cache
    let mut next = env.library();
    assert_eq!(*next.get_entries().unwrap(), scanned);
    assert_eq!(next.source(), IndexState::CacheHit);
}

#[test]
fn test_refresh_flag_with_existing_cache() {
    let env = TestEnvironment::new();
    env.write("a.nro", &NroImage::new("Alpha").build());
    env.configure_root();

    env.library().get_entries().unwrap();

    // New title arrives and the flag is raised externally
    env.write("b.nro", &NroImage::new("Beta").build());
    env.preferences()
        .set_bool(REFRESH_REQUIRED_KEY, true)
        .unwrap();

    let mut library = env.library();
    assert_eq!(library.get_entries().unwrap().len(), 2);
    assert_eq!(library.source(), IndexState::Rescanning);
    assert!(!env.preferences().get_bool(REFRESH_REQUIRED_KEY, true));
}

#[test]
fn test_stale_cache_is_served_until_invalidated() {
    let env = TestEnvironment::new();
    env.write("a.nro", &NroImage::new("Alpha").build());
    env.configure_root();
    env.library().get_entries().unwrap();

    env.write("b.nro", &NroImage::new("Beta").build());

    let mut library = env.library();
    assert_eq!(library.get_entries().unwrap().len(), 1);

    assert_eq!(library.force_refresh().unwrap().len(), 2);
}

#[test]
fn test_empty_tree_is_not_an_error() {
    let env = TestEnvironment::new();
    env.write("docs/readme.txt", b"nothing here");
    env.configure_root();

    let mut library = env.library();
    let index = library.get_entries().unwrap();
    assert!(index.is_empty());
    assert_eq!(library.state(), IndexState::Ready);
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_followed_once() {
    let env = TestEnvironment::new();
    env.write("real/a.nro", &NroImage::new("Alpha").build());
    std::os::unix::fs::symlink(env.games_dir.join("real"), env.games_dir.join("link"))
        .expect("Failed to create symlink");

    let outside = env.temp_dir.path().join("outside");
    fs::create_dir_all(&outside).expect("Failed to create directory");
    fs::write(outside.join("b.nro"), NroImage::new("Beta").build())
        .expect("Failed to write test file");
    std::os::unix::fs::symlink(&outside, env.games_dir.join("external"))
        .expect("Failed to create symlink");

    let result = DirectoryScanner::new()
        .scan(&LocalStorage::new(), &env.root(), "nro", &NroLoader::new())
        .unwrap();

    let mut names: Vec<_> = result.entries.iter().map(|e| e.name()).collect();
    names.sort();
    assert_eq!(names, vec!["Alpha", "Beta"]);
}

#[cfg(unix)]
#[test]
fn test_symlink_cycles_terminate() {
    let env = TestEnvironment::new();
    env.write("a.nro", &NroImage::new("Alpha").build());
    env.write("sub/b.nro", &NroImage::new("Beta").build());
    for link in ["x", "y", "sub/up"] {
        std::os::unix::fs::symlink(&env.games_dir, env.games_dir.join(link))
            .expect("Failed to create symlink");
    }

    let result = DirectoryScanner::new()
        .scan(&LocalStorage::new(), &env.root(), "nro", &NroLoader::new())
        .unwrap();

    assert_eq!(result.entries.len(), 2);
    assert!(result.skipped.is_empty());
}
