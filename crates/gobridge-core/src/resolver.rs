//! Locating native shared libraries on disk.
//!
//! Candidates for a library are its bare file name (left to the platform's
//! own search rules) followed by the file name joined onto each configured
//! search directory. The first candidate that opens wins. When nothing opens
//! the bare name is returned anyway, so the real load reports the platform's
//! error.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Environment variable holding extra library directories.
pub const LIBRARY_PATH_ENV: &str = "GOBRIDGE_LIBRARY_PATH";

/// The logical native libraries the bridge knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeLibrary {
    GLib,
    GObject,
    Gio,
    Gtk4,
    Gtk3,
    Adwaita,
    AyatanaAppIndicator,
    Cairo,
}

impl NativeLibrary {
    /// Every known library.
    pub const ALL: [NativeLibrary; 8] = [
        Self::GLib,
        Self::GObject,
        Self::Gio,
        Self::Gtk4,
        Self::Gtk3,
        Self::Adwaita,
        Self::AyatanaAppIndicator,
        Self::Cairo,
    ];

    /// The platform file name of this library.
    pub fn file_name(self, os: OsFamily) -> &'static str {
        match (self, os) {
            (Self::Gtk4, OsFamily::Unix) => "libgtk-4.so.1",
            (Self::Gtk4, OsFamily::Darwin) => "libgtk-4.1.dylib",
            (Self::Gtk4, OsFamily::Windows) => "libgtk-4-1.dll",

            (Self::Gtk3, OsFamily::Unix) => "libgtk-3.so.0",
            (Self::Gtk3, OsFamily::Darwin) => "libgtk-3.0.dylib",
            (Self::Gtk3, OsFamily::Windows) => "libgtk-3-0.dll",

            (Self::AyatanaAppIndicator, OsFamily::Unix) => "libayatana-appindicator3.so.1",
            (Self::AyatanaAppIndicator, OsFamily::Darwin) => "libayatana-appindicator3.1.dylib",
            (Self::AyatanaAppIndicator, OsFamily::Windows) => "libayatana-appindicator3-1.dll",

            (Self::Adwaita, OsFamily::Unix) => "libadwaita-1.so.0",
            (Self::Adwaita, OsFamily::Darwin) => "libadwaita-1.dylib",
            (Self::Adwaita, OsFamily::Windows) => "libadwaita-1-0.dll",

            (Self::GLib, OsFamily::Unix) => "libglib-2.0.so.0",
            (Self::GLib, OsFamily::Darwin) => "libglib-2.0.dylib",
            (Self::GLib, OsFamily::Windows) => "libglib-2.0-0.dll",

            (Self::GObject, OsFamily::Unix) => "libgobject-2.0.so.0",
            (Self::GObject, OsFamily::Darwin) => "libgobject-2.0.dylib",
            (Self::GObject, OsFamily::Windows) => "libgobject-2.0-0.dll",

            (Self::Gio, OsFamily::Unix) => "libgio-2.0.so.0",
            (Self::Gio, OsFamily::Darwin) => "libgio-2.0.dylib",
            (Self::Gio, OsFamily::Windows) => "libgio-2.0-0.dll",

            (Self::Cairo, OsFamily::Unix) => "libcairo.so.2",
            (Self::Cairo, OsFamily::Darwin) => "libcairo.2.dylib",
            (Self::Cairo, OsFamily::Windows) => "libcairo-2.dll",
        }
    }
}

impl fmt::Display for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GLib => "glib-2.0",
            Self::GObject => "gobject-2.0",
            Self::Gio => "gio-2.0",
            Self::Gtk4 => "gtk-4",
            Self::Gtk3 => "gtk-3",
            Self::Adwaita => "adwaita-1",
            Self::AyatanaAppIndicator => "ayatana-appindicator3",
            Self::Cairo => "cairo",
        };
        f.write_str(name)
    }
}

/// Operating-system families with distinct library naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Linux and the BSDs.
    Unix,
    /// macOS.
    Darwin,
    Windows,
}

impl OsFamily {
    /// The family of the running platform.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Unix
        }
    }
}

impl Default for OsFamily {
    fn default() -> Self {
        Self::current()
    }
}

/// An ordered list of directories to look for libraries in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPaths {
    dirs: Vec<PathBuf>,
}

impl SearchPaths {
    /// A list with exactly `dirs`.
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in directories for an OS family.
    pub fn default_for(os: OsFamily) -> Self {
        match os {
            OsFamily::Unix => Self::new(["/usr/lib", "/usr/local/lib", "/run/current-system/sw/lib"]),
            OsFamily::Darwin => Self::new(["/opt/homebrew/lib", "/usr/local/lib"]),
            OsFamily::Windows => Self::new(["C:/tools/msys64/mingw64/bin"]),
        }
    }

    /// The built-in directories for the running platform, preceded by any
    /// directories listed in `GOBRIDGE_LIBRARY_PATH`.
    pub fn from_env() -> Self {
        let mut paths = Self::default_for(OsFamily::current());
        if let Some(value) = env::var_os(LIBRARY_PATH_ENV) {
            paths.prepend_path_list(&value);
        }
        paths
    }

    /// Prepends the directories of a platform path list (`:` or `;`
    /// separated), keeping their order.
    pub fn prepend_path_list(&mut self, list: &OsString) {
        let extra: Vec<PathBuf> = env::split_paths(list)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();
        self.dirs.splice(0..0, extra);
    }

    /// Adds a directory with the highest priority.
    pub fn with_prepended(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(0, dir.into());
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Candidate paths for `file_name`, de-duplicated in order.
    pub fn candidates(&self, file_name: &str) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::with_capacity(self.dirs.len() + 1);
        let bare = std::iter::once(PathBuf::from(file_name));
        for candidate in bare.chain(self.dirs.iter().map(|dir| dir.join(file_name))) {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }
}

/// Finds library files and remembers what [`resolve`](Self::resolve) found.
#[derive(Debug)]
pub struct LibraryResolver {
    search_paths: SearchPaths,
    os: OsFamily,
    cache: Mutex<HashMap<NativeLibrary, PathBuf>>,
}

impl LibraryResolver {
    pub fn new(search_paths: SearchPaths, os: OsFamily) -> Self {
        Self {
            search_paths,
            os,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search_paths
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    /// Resolves `library` by trial-opening each candidate. Results are
    /// cached on this resolver.
    pub fn resolve(&self, library: NativeLibrary) -> PathBuf {
        self.resolve_cached(library, probe_library)
    }

    fn resolve_cached<P>(&self, library: NativeLibrary, probe: P) -> PathBuf
    where
        P: FnMut(&Path) -> bool,
    {
        if let Some(path) = self.cache.lock().get(&library) {
            return path.clone();
        }
        let resolved = self.search(library, probe);
        self.cache.lock().insert(library, resolved.clone());
        resolved
    }

    /// Resolves `library` with a custom probe deciding whether a candidate
    /// is loadable. Neither reads nor fills the cache.
    pub fn resolve_with<P>(&self, library: NativeLibrary, probe: P) -> PathBuf
    where
        P: FnMut(&Path) -> bool,
    {
        self.search(library, probe)
    }

    fn search<P>(&self, library: NativeLibrary, mut probe: P) -> PathBuf
    where
        P: FnMut(&Path) -> bool,
    {
        let file_name = library.file_name(self.os);
        let candidates = self.search_paths.candidates(file_name);
        let resolved = candidates
            .iter()
            .find(|candidate| probe(candidate))
            .cloned()
            .unwrap_or_else(|| {
                tracing::debug!(
                    target: "gobridge_core::loader",
                    %library,
                    tried = candidates.len(),
                    "no candidate opened; falling back to the bare file name"
                );
                PathBuf::from(file_name)
            });

        tracing::debug!(
            target: "gobridge_core::loader",
            %library,
            path = %resolved.display(),
            "resolved native library"
        );
        resolved
    }

    /// Forgets every cached resolution.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

impl Default for LibraryResolver {
    fn default() -> Self {
        Self::new(SearchPaths::from_env(), OsFamily::current())
    }
}

/// Opens and immediately closes `path`.
fn probe_library(path: &Path) -> bool {
    // SAFETY: see `symbols::open_library`; the handle is closed right away.
    match unsafe { libloading::Library::new(path) } {
        Ok(library) => {
            let _ = library.close();
            true
        }
        Err(_) => false,
    }
}
