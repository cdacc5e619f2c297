//! Output rewriting
//!
//! A kept class is written with only its reachable fields and methods and
//! with interfaces that are either outside the program or still reachable.
//! The constant pool is compacted afterwards.

use super::builder::ProgramClass;
use super::{Result, ShrinkInputs, ShrinkerError};
use crate::classfile::{compact_constant_pool, ClassFile, MemberInfo};
use crate::discovery::ClassDirectory;
use crate::graph::{CounterSet, ShrinkerGraph};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Output location of a class file, mirroring its place below its input root
pub fn relative_output_path(inputs: &[ClassDirectory], source: &Path, class_name: &str) -> PathBuf {
    inputs
        .iter()
        .find_map(|dir| dir.relative_path(source))
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.class", class_name)))
}

/// Fail when the output directory is, contains or lies inside an input
/// root. Runs delete and overwrite below the output directory.
pub fn check_output_dir(output_dir: &Path, inputs: &ShrinkInputs) -> Result<()> {
    let output = resolve_path(output_dir)?;
    for dir in inputs.program.iter().chain(&inputs.libraries) {
        let root = resolve_path(&dir.root)?;
        if output.starts_with(&root) || root.starts_with(&output) {
            return Err(ShrinkerError::OutputOverlapsInput {
                output: output_dir.to_path_buf(),
                input: dir.root.clone(),
            });
        }
    }
    Ok(())
}

/// Canonical form of a path whose trailing components may not exist yet
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| ShrinkerError::io(path, e))?
            .join(path)
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing.iter().rev().fold(canonical, |acc: PathBuf, part| acc.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

/// Remove everything a previous run wrote
pub fn clear_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir).map_err(|e| ShrinkerError::io(output_dir, e))?;
    }
    fs::create_dir_all(output_dir).map_err(|e| ShrinkerError::io(output_dir, e))
}

pub struct OutputRewriter<'a> {
    graph: &'a ShrinkerGraph,
    set: CounterSet,
    output_dir: PathBuf,
}

impl<'a> OutputRewriter<'a> {
    pub fn new(graph: &'a ShrinkerGraph, output_dir: &Path) -> Self {
        Self {
            graph,
            set: CounterSet::Shrink,
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Bytes of the shrunk class
    pub fn rewrite(&self, class: &ProgramClass) -> Result<Vec<u8>> {
        let mut file = class.file.clone();
        let kept = match self.graph.find_class(&class.name) {
            Some(node) => self.graph.reachable_members(node, self.set),
            None => BTreeSet::new(),
        };

        file.fields = retain_members(&file, &file.fields, &kept)?;
        file.methods = retain_members(&file, &file.methods, &kept)?;

        let mut interfaces = Vec::with_capacity(file.interfaces.len());
        for index in &file.interfaces {
            let name = file.constant_pool.class_name(*index)?;
            let keep = match self.graph.find_class(name) {
                Some(node) => self.graph.is_library_class(node) || self.graph.is_reachable(node, self.set),
                None => true,
            };
            if keep {
                interfaces.push(*index);
            } else {
                debug!("Dropping interface {} from {}", name, class.name);
            }
        }
        file.interfaces = interfaces;

        if !compact_constant_pool(&mut file)? {
            debug!("Keeping the original constant pool of {}", class.name);
        }
        Ok(file.to_bytes())
    }

    pub fn output_path(&self, relative_path: &Path) -> PathBuf {
        self.output_dir.join(relative_path)
    }

    /// Rewrite and write the given classes in parallel; returns the number
    /// written
    pub fn write_all(&self, classes: &[&ProgramClass]) -> Result<usize> {
        classes
            .par_iter()
            .map(|class| {
                let bytes = self.rewrite(class)?;
                let path = self.output_path(&class.relative_path);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| ShrinkerError::io(parent, e))?;
                }
                fs::write(&path, bytes).map_err(|e| ShrinkerError::io(&path, e))
            })
            .collect::<Result<Vec<()>>>()?;
        info!("Wrote {} classes to {}", classes.len(), self.output_dir.display());
        Ok(classes.len())
    }

    /// Delete previously written outputs; returns the number deleted
    pub fn delete_all(&self, relative_paths: &[PathBuf]) -> Result<usize> {
        let mut deleted = 0;
        for relative in relative_paths {
            let path = self.output_path(relative);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| ShrinkerError::io(&path, e))?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!("Deleted {} classes from {}", deleted, self.output_dir.display());
        }
        Ok(deleted)
    }
}

fn retain_members(file: &ClassFile, members: &[MemberInfo], kept: &BTreeSet<String>) -> Result<Vec<MemberInfo>> {
    let mut retained = Vec::with_capacity(members.len());
    for member in members {
        if kept.contains(&file.member_id(member)?) {
            retained.push(member.clone());
        }
    }
    Ok(retained)
}
