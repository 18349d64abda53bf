/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::path::{Component, Path, PathBuf};

use crate::errors::TftpError;

/// Boot programs served over TFTP and HTTP, all below one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a requested name to a path inside the store. Leading slashes are
    /// ignored; anything trying to leave the directory is rejected.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, TftpError> {
        let relative = Path::new(name.trim_start_matches('/'));
        let mut path = self.root.clone();
        let mut depth = 0;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(TftpError::InvalidPath(name.to_string()));
                }
            }
        }

        if depth == 0 {
            return Err(TftpError::InvalidPath(name.to_string()));
        }
        Ok(path)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, TftpError> {
        let path = self.resolve(name)?;
        Ok(tokio::fs::read(&path).await?)
    }
}
