// SPDX-License-Identifier: GPL-3.0-or-later

//! Index of raw exported streams named by numeric id (`{id}.wem`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AudioError;

#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    streams: HashMap<u32, PathBuf>,
}

impl SourceIndex {
    pub fn build(root: &Path) -> Result<Self, AudioError> {
        let mut streams = HashMap::new();
        let mut stack = vec![root.to_path_buf()];

        while let Some(directory) = stack.pop() {
            let entries = std::fs::read_dir(&directory).map_err(|e| AudioError::io(&directory, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| AudioError::io(&directory, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| AudioError::io(&path, e))?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }

                let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
                    continue;
                };
                if !extension.eq_ignore_ascii_case("wem") {
                    continue;
                }
                let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse::<u32>().ok())
                else {
                    continue;
                };
                streams.entry(id).or_insert(path);
            }
        }

        info!(target: "audio", root = %root.display(), streams = streams.len(), "source index built");
        Ok(Self { streams })
    }

    pub fn find(&self, id: u32) -> Option<&Path> {
        self.streams.get(&id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
