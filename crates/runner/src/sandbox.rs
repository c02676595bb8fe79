// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path sandbox for operator-injected commands.
//!
//! The working directory at start is the root. `cd` may move anywhere
//! inside it; every candidate is canonicalized and must keep the root as
//! a path prefix, so `..` chains and symlinks cannot escape.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    cwd: PathBuf,
}

impl Sandbox {
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("sandbox root {} does not exist", root.display()))?;
        if !root.is_dir() {
            bail!("sandbox root {} is not a directory", root.display());
        }
        Ok(Self { cwd: root.clone(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Current directory relative to the root, `.` at the root itself.
    pub fn rel_display(&self) -> String {
        match self.cwd.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => ".".to_owned(),
        }
    }

    /// Change directory, rejecting any path that leaves the root.
    pub fn change_dir(&mut self, candidate: &str) -> anyhow::Result<()> {
        let target = self.resolve(candidate)?;
        if !target.is_dir() {
            bail!("not a directory: {candidate}");
        }
        self.cwd = target;
        Ok(())
    }

    /// Resolve a candidate path and verify containment.
    fn resolve(&self, candidate: &str) -> anyhow::Result<PathBuf> {
        let joined = if Path::new(candidate).is_absolute() {
            PathBuf::from(candidate)
        } else {
            self.cwd.join(candidate)
        };
        let resolved = joined
            .canonicalize()
            .with_context(|| format!("no such path: {candidate}"))?;

        let escapes = match resolved.strip_prefix(&self.root) {
            Ok(rel) => rel.components().any(|c| matches!(c, std::path::Component::ParentDir)),
            Err(_) => true,
        };
        if escapes {
            bail!("path escapes sandbox: {candidate}");
        }
        Ok(resolved)
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
