//! Resolution of path templates to concrete files.
//!
//! Resolution steps:
//!
//! 1. Substitute the version token (`{version}` becomes `_<version>`).
//! 2. Expand `~`, resolve relative paths against the base directory. Absolute templates are
//!    rejected with [`IngestError::PathPolicy`] when the absolute-paths policy is off.
//! 3. Wildcard templates (`*`, `?`, `[`) select the lexicographically smallest match.
//! 4. If nothing matched, the fallback template is resolved the same way (with its own
//!    version substitution) but never its own fallback: fallback chains are one level deep.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use crate::cache::{modified, Cache, ResolutionKey, Stamp};
use crate::error::{IngestError, IngestResult};

/// Placeholder substituted with the caller's version id.
pub const VERSION_TOKEN: &str = "{version}";

const WILDCARDS: &[char] = &['*', '?', '['];

/// Replace [`VERSION_TOKEN`] with `_<version>` (or nothing when `version` is empty).
pub fn substitute_version(template: &str, version: &str) -> String {
    let replacement = if version.is_empty() {
        String::new()
    } else {
        format!("_{version}")
    };
    template.replace(VERSION_TOKEN, &replacement)
}

/// Options controlling path resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Whether templates may be absolute paths.
    pub allow_absolute_paths: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            allow_absolute_paths: true,
        }
    }
}

/// Owned resolution request, handy for queuing or logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolutionRequest {
    pub template: String,
    pub version: String,
    pub fallback_template: Option<String>,
    pub base_dir: PathBuf,
}

/// Result of a resolution: the chosen path (if any) and what was considered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathResolution {
    pub resolved: Option<PathBuf>,
    /// Every concrete path checked or matched, primary first, for diagnostics.
    pub candidates: Vec<PathBuf>,
    /// Whether the resolved path came from the fallback template.
    pub used_fallback: bool,
}

/// A template after substitution and expansion, before touching the filesystem.
#[derive(Debug, Clone)]
struct Expanded {
    pattern: PathBuf,
    has_wildcards: bool,
    /// Deepest directory whose listing determines the result.
    anchor: PathBuf,
    /// Glob for the directories below the anchor that are walked, when a wildcard sits in a
    /// directory component.
    walked_dirs: Option<PathBuf>,
}

impl Expanded {
    /// Modification times of every directory a scan of this template reads.
    fn directory_times(&self) -> Vec<Option<SystemTime>> {
        let mut times = vec![modified(&self.anchor)];
        let Some(dirs) = &self.walked_dirs else {
            return times;
        };
        let mut walked: Vec<PathBuf> = match glob::glob(&dirs.to_string_lossy()) {
            Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_dir()).collect(),
            Err(_) => Vec::new(),
        };
        walked.sort();
        times.extend(walked.iter().map(|dir| modified(dir)));
        times
    }
}

/// Resolves templates through a shared [`Cache`].
///
/// Results are cached under the request and validated against the modification times of the
/// directories being searched (every directory matched by a wildcard directory component
/// included) and of the resolved file.
#[derive(Debug)]
pub struct PathResolver {
    cache: Arc<Cache>,
    options: ResolveOptions,
    scans: AtomicUsize,
}

impl PathResolver {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self::with_options(cache, ResolveOptions::default())
    }

    pub fn with_options(cache: Arc<Cache>, options: ResolveOptions) -> Self {
        Self {
            cache,
            options,
            scans: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// Number of filesystem scans (glob enumerations or existence checks) performed.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Resolve an owned request. See [`PathResolver::resolve`].
    pub fn resolve_request(&self, req: &PathResolutionRequest) -> IngestResult<PathResolution> {
        self.resolve(
            &req.template,
            &req.version,
            req.fallback_template.as_deref(),
            &req.base_dir,
        )
    }

    /// Resolve `template` (and, if needed, `fallback`) for `version` relative to `base_dir`.
    ///
    /// `Ok(resolution)` with `resolved == None` means no file was found; that is ordinary
    /// control flow, not an error.
    pub fn resolve(
        &self,
        template: &str,
        version: &str,
        fallback: Option<&str>,
        base_dir: &Path,
    ) -> IngestResult<PathResolution> {
        let primary = self.expand(template, version, base_dir)?;
        let secondary = fallback
            .map(|fb| self.expand(fb, version, base_dir))
            .transpose()?;

        let key = ResolutionKey {
            template: template.to_string(),
            version: version.to_string(),
            fallback: fallback.map(str::to_string),
            base_dir: base_dir.to_path_buf(),
            allow_absolute_paths: self.options.allow_absolute_paths,
        };

        let fingerprint = |resolved: Option<&Path>| {
            Stamp::of(
                std::iter::once(&primary)
                    .chain(secondary.as_ref())
                    .flat_map(Expanded::directory_times)
                    .chain(std::iter::once(resolved.and_then(modified))),
            )
        };

        let cached = self.cache.resolutions().get_if(&key, |entry| {
            entry.stamp == fingerprint(entry.value.resolved.as_deref())
        });
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let mut resolution = PathResolution::default();
        resolution.resolved = self.scan(&primary, &mut resolution.candidates);
        if resolution.resolved.is_none() {
            if let Some(secondary) = &secondary {
                tracing::debug!(
                    template,
                    fallback = fallback.unwrap_or_default(),
                    "no match for primary template, trying fallback"
                );
                resolution.resolved = self.scan(secondary, &mut resolution.candidates);
                resolution.used_fallback = resolution.resolved.is_some();
            }
        }

        tracing::debug!(
            template,
            version,
            resolved = ?resolution.resolved,
            candidates = resolution.candidates.len(),
            "resolved path template"
        );

        let stamp = fingerprint(resolution.resolved.as_deref());
        self.cache
            .resolutions()
            .insert(key, stamp, resolution.clone());
        Ok(resolution)
    }

    fn expand(&self, template: &str, version: &str, base_dir: &Path) -> IngestResult<Expanded> {
        let substituted = substitute_version(template, version);
        let expanded = expand_tilde(&substituted);

        let absolute = expanded.is_absolute();
        if absolute && !self.options.allow_absolute_paths {
            return Err(IngestError::PathPolicy {
                template: template.to_string(),
            });
        }

        // Wildcard-free leading components of the template itself.
        let mut literal = PathBuf::new();
        let mut has_wildcards = false;
        let mut wildcard_in_dir = false;
        let components: Vec<Component<'_>> = expanded.components().collect();
        for (i, component) in components.iter().enumerate() {
            let part = component.as_os_str().to_string_lossy();
            if part.contains(WILDCARDS) {
                has_wildcards = true;
                wildcard_in_dir = i + 1 < components.len();
                break;
            }
            literal.push(component);
        }

        let (pattern, anchor) = if absolute {
            (expanded.clone(), literal)
        } else {
            (base_dir.join(&expanded), base_dir.join(&literal))
        };
        let anchor = if has_wildcards {
            anchor
        } else {
            anchor
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base_dir.to_path_buf())
        };

        let pattern = if has_wildcards && !absolute {
            escaped_join(base_dir, &expanded)
        } else {
            pattern
        };
        let walked_dirs = if wildcard_in_dir {
            pattern.parent().map(Path::to_path_buf)
        } else {
            None
        };

        Ok(Expanded {
            pattern,
            has_wildcards,
            anchor,
            walked_dirs,
        })
    }

    fn scan(&self, expanded: &Expanded, candidates: &mut Vec<PathBuf>) -> Option<PathBuf> {
        self.scans.fetch_add(1, Ordering::Relaxed);

        if !expanded.has_wildcards {
            candidates.push(expanded.pattern.clone());
            return expanded.pattern.is_file().then(|| expanded.pattern.clone());
        }

        let pattern = expanded.pattern.to_string_lossy();
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "invalid glob pattern");
                return None;
            }
        };
        let mut matches: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        // Listing order is filesystem dependent; sorting makes the choice reproducible.
        matches.sort();
        let first = matches.first().cloned();
        candidates.extend(matches);
        first
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs
            .home_dir()
            .join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}

/// Join a literal base directory with a relative glob, escaping glob syntax in the base.
fn escaped_join(base_dir: &Path, relative: &Path) -> PathBuf {
    let base = glob::Pattern::escape(&base_dir.to_string_lossy());
    let mut out = PathBuf::from(base);
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
