// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`FilePath`], the canonical on-the-wire representation of a path produced by
//! this crate.

use std::fmt;

/// An immutable path: an ordered sequence of directory segments, a base name, an
/// optional extension, and the separator used to render them.
///
/// Rendering is the canonical wire representation and must be stable: segments
/// are joined with `separator`, the base name follows, and `.` + extension is
/// appended if present. A path with no directory segments renders as just the
/// base name, with no leading separator.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FilePath {
    dirs: Vec<String>,
    name: String,
    extension: Option<String>,
    separator: String,
}

impl FilePath {
    /// Builds a `FilePath`, splitting `name` on its last `.` to derive the
    /// extension. A `name` without a `.` has no extension.
    pub fn new(dirs: Vec<String>, name: impl Into<String>, separator: impl Into<String>) -> Self {
        let name = name.into();
        let (name, extension) = match name.rfind('.') {
            Some(index) => {
                let extension = &name[index + 1..];
                if extension.is_empty() {
                    (name[..index].to_string(), None)
                } else {
                    (name[..index].to_string(), Some(extension.to_string()))
                }
            }
            None => (name, None),
        };

        FilePath {
            dirs,
            name,
            extension,
            separator: separator.into(),
        }
    }

    /// The directory segments, excluding the base name.
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// The base name, without its extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The extension (without the leading `.`), or empty if `name` had none.
    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("")
    }

    /// The separator used to join `dirs` and append them to `name` when rendering.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Renders the canonical, stable string form of this path.
    pub fn render(&self) -> String {
        let mut rendered = if self.dirs.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.dirs.join(&self.separator), self.separator, self.name)
        };

        if let Some(extension) = &self.extension {
            rendered.push('.');
            rendered.push_str(extension);
        }

        rendered
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_no_directory_as_just_the_base() {
        let path = FilePath::new(vec![], "file.txt", "/");
        assert_eq!(path.render(), "file.txt");
    }

    #[test]
    fn renders_with_directories_joined_by_separator() {
        let path = FilePath::new(vec!["a".into(), "b".into()], "file.txt", "/");
        assert_eq!(path.render(), "a/b/file.txt");
    }

    #[test]
    fn splits_extension_on_last_dot() {
        let path = FilePath::new(vec![], "archive.tar.gz", "/");
        assert_eq!(path.name(), "archive.tar");
        assert_eq!(path.extension(), "gz");
    }

    #[test]
    fn name_without_dot_has_empty_extension() {
        let path = FilePath::new(vec![], "README", "/");
        assert_eq!(path.name(), "README");
        assert_eq!(path.extension(), "");
    }

    #[test]
    fn trailing_dot_yields_no_extension_and_no_trailing_dot_on_render() {
        let path = FilePath::new(vec![], "file.", "/");
        assert_eq!(path.name(), "file");
        assert_eq!(path.extension(), "");
        assert_eq!(path.render(), "file");
    }

    #[test]
    fn render_contains_exactly_len_dirs_occurrences_of_separator_between_segments() {
        let dirs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let path = FilePath::new(dirs.clone(), "file.txt", "/");
        let rendered = path.render();
        // len(dirs) separators between segments, plus one trailing separator before the base.
        assert_eq!(rendered.matches('/').count(), dirs.len());
    }

    #[test]
    fn render_is_deterministic() {
        let path = FilePath::new(vec!["a".into()], "b.c", "/");
        assert_eq!(path.render(), path.render());
    }
}
